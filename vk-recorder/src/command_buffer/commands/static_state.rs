use crate::{
    command_buffer::{DirtyFlags, RawCommandBuffer, RecordingCommandBuffer},
    pipeline::{
        BlendFactor, BlendOp, CompareOp, CullMode, FrontFace, PipelineState, PrimitiveTopology,
        StencilOpState,
    },
};

/// # Commands to set state baked into pipelines
///
/// Setting a value equal to the current one does nothing. Any actual change makes the next draw
/// or dispatch resolve its pipeline again.
impl<R: RawCommandBuffer> RecordingCommandBuffer<R> {
    #[inline]
    fn update_static_state(&mut self, f: impl FnOnce(&mut PipelineState)) -> &mut Self {
        let old = self.static_state;
        f(&mut self.static_state);

        if self.static_state != old {
            self.dirty |= DirtyFlags::STATIC_STATE;
        }

        self
    }

    /// Replaces the whole static state.
    pub fn set_static_state(&mut self, state: PipelineState) -> &mut Self {
        self.update_static_state(|s| *s = state)
    }

    /// Sets the static state to [`PipelineState::opaque`].
    pub fn set_opaque_state(&mut self) -> &mut Self {
        self.set_static_state(PipelineState::opaque())
    }

    /// Sets the static state to [`PipelineState::quad`].
    pub fn set_quad_state(&mut self) -> &mut Self {
        self.set_static_state(PipelineState::quad())
    }

    /// Sets the static state to [`PipelineState::opaque_sprite`].
    pub fn set_opaque_sprite_state(&mut self) -> &mut Self {
        self.set_static_state(PipelineState::opaque_sprite())
    }

    /// Sets the static state to [`PipelineState::transparent_sprite`].
    pub fn set_transparent_sprite_state(&mut self) -> &mut Self {
        self.set_static_state(PipelineState::transparent_sprite())
    }

    pub fn set_depth_test(&mut self, depth_test: bool, depth_write: bool) -> &mut Self {
        self.update_static_state(|s| {
            s.depth_test = depth_test;
            s.depth_write = depth_write;
        })
    }

    pub fn set_depth_compare(&mut self, compare_op: CompareOp) -> &mut Self {
        self.update_static_state(|s| s.depth_compare = compare_op)
    }

    /// Enables depth bias. The bias itself is set with [`set_depth_bias`].
    ///
    /// [`set_depth_bias`]: Self::set_depth_bias
    pub fn set_depth_bias_enable(&mut self, enable: bool) -> &mut Self {
        self.update_static_state(|s| s.depth_bias_enable = enable)
    }

    pub fn set_wireframe(&mut self, wireframe: bool) -> &mut Self {
        self.update_static_state(|s| s.wireframe = wireframe)
    }

    pub fn set_cull_mode(&mut self, cull_mode: CullMode) -> &mut Self {
        self.update_static_state(|s| s.cull_mode = cull_mode)
    }

    pub fn set_front_face(&mut self, front_face: FrontFace) -> &mut Self {
        self.update_static_state(|s| s.front_face = front_face)
    }

    pub fn set_primitive_topology(&mut self, topology: PrimitiveTopology) -> &mut Self {
        self.update_static_state(|s| s.topology = topology)
    }

    pub fn set_primitive_restart(&mut self, enable: bool) -> &mut Self {
        self.update_static_state(|s| s.primitive_restart = enable)
    }

    /// Enables stencil testing. The masks and references are set with
    /// [`set_stencil_reference`].
    ///
    /// [`set_stencil_reference`]: Self::set_stencil_reference
    pub fn set_stencil_test(&mut self, enable: bool) -> &mut Self {
        self.update_static_state(|s| s.stencil_test = enable)
    }

    pub fn set_stencil_front_ops(&mut self, ops: StencilOpState) -> &mut Self {
        self.update_static_state(|s| s.stencil_front = ops)
    }

    pub fn set_stencil_back_ops(&mut self, ops: StencilOpState) -> &mut Self {
        self.update_static_state(|s| s.stencil_back = ops)
    }

    /// Sets the same stencil operations for both faces.
    pub fn set_stencil_ops(&mut self, ops: StencilOpState) -> &mut Self {
        self.update_static_state(|s| {
            s.stencil_front = ops;
            s.stencil_back = ops;
        })
    }

    pub fn set_blend_enable(&mut self, enable: bool) -> &mut Self {
        self.update_static_state(|s| s.blend_enable = enable)
    }

    /// Sets the same blend factors for color and alpha.
    pub fn set_blend_factors(&mut self, src: BlendFactor, dst: BlendFactor) -> &mut Self {
        self.set_blend_factors_separate(src, src, dst, dst)
    }

    pub fn set_blend_factors_separate(
        &mut self,
        src_color: BlendFactor,
        src_alpha: BlendFactor,
        dst_color: BlendFactor,
        dst_alpha: BlendFactor,
    ) -> &mut Self {
        self.update_static_state(|s| {
            s.src_color_blend = src_color;
            s.src_alpha_blend = src_alpha;
            s.dst_color_blend = dst_color;
            s.dst_alpha_blend = dst_alpha;
        })
    }

    /// Sets the same blend operation for color and alpha.
    pub fn set_blend_op(&mut self, op: BlendOp) -> &mut Self {
        self.set_blend_op_separate(op, op)
    }

    pub fn set_blend_op_separate(&mut self, color_op: BlendOp, alpha_op: BlendOp) -> &mut Self {
        self.update_static_state(|s| {
            s.color_blend_op = color_op;
            s.alpha_blend_op = alpha_op;
        })
    }

    /// Sets which components of which color attachments are written, four bits per attachment.
    pub fn set_color_write_mask(&mut self, write_mask: u32) -> &mut Self {
        self.update_static_state(|s| s.write_mask = write_mask)
    }

    pub fn set_multisample_state(
        &mut self,
        alpha_to_coverage: bool,
        alpha_to_one: bool,
        sample_shading: bool,
    ) -> &mut Self {
        self.update_static_state(|s| {
            s.alpha_to_coverage = alpha_to_coverage;
            s.alpha_to_one = alpha_to_one;
            s.sample_shading = sample_shading;
        })
    }

    pub fn set_conservative_rasterization(&mut self, enable: bool) -> &mut Self {
        self.update_static_state(|s| s.conservative_raster = enable)
    }

    /// Controls the subgroup size of compute pipelines, as the base-2 logarithm of the allowed
    /// range.
    ///
    /// # Panics
    ///
    /// - Panics if `minimum_log2` or `maximum_log2` is greater than 7.
    /// - Panics if `minimum_log2` is greater than `maximum_log2`.
    pub fn set_subgroup_size_log2(
        &mut self,
        control_size: bool,
        minimum_log2: u8,
        maximum_log2: u8,
    ) -> &mut Self {
        assert!(minimum_log2 < 8 && maximum_log2 < 8, "subgroup sizes are limited to 128");
        assert!(minimum_log2 <= maximum_log2, "the subgroup size range is empty");

        self.update_static_state(|s| {
            s.subgroup_control_size = control_size;
            s.subgroup_minimum_size_log2 = minimum_log2;
            s.subgroup_maximum_size_log2 = maximum_log2;
        })
    }

    /// Requires compute workgroups to be made of full subgroups.
    pub fn set_subgroup_full_group(&mut self, enable: bool) -> &mut Self {
        self.update_static_state(|s| s.subgroup_full_group = enable)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        command_buffer::DirtyFlags,
        pipeline::{CullMode, PipelineState},
        tests::recorder,
    };

    #[test]
    fn setters_mark_only_changes() {
        let (_device, mut cb) = recorder();
        cb.set_opaque_state();
        cb.clear_dirty_for_tests();

        cb.set_cull_mode(CullMode::Back).set_depth_test(true, true);
        assert!(cb.dirty().is_empty());

        cb.set_cull_mode(CullMode::Front);
        assert_eq!(cb.dirty(), DirtyFlags::STATIC_STATE);
        assert_eq!(cb.static_state().cull_mode, CullMode::Front);
    }

    #[test]
    fn presets() {
        let (_device, mut cb) = recorder();
        cb.set_transparent_sprite_state();
        assert_eq!(*cb.static_state(), PipelineState::transparent_sprite());
        cb.clear_dirty_for_tests();

        cb.set_transparent_sprite_state();
        assert!(cb.dirty().is_empty());

        cb.set_quad_state();
        assert!(cb.dirty().contains(DirtyFlags::STATIC_STATE));
    }

    #[test]
    fn subgroup_size_range() {
        let (_device, mut cb) = recorder();

        assert_should_panic!("empty", {
            cb.set_subgroup_size_log2(true, 5, 4);
        });
    }
}
