use crate::{
    command_buffer::{DirtyFlags, RawCommandBuffer, RecordingCommandBuffer},
    limits::NUM_SPEC_CONSTANTS,
    pipeline::{DynamicState, PotentialState, Scissor, Viewport},
};

/// # Commands to set dynamic state
///
/// Dynamic state is emitted right before the next draw that needs it, and only if it changed
/// since it was last emitted.
impl<R: RawCommandBuffer> RecordingCommandBuffer<R> {
    #[inline]
    fn update_dynamic_state(
        &mut self,
        flags: DirtyFlags,
        f: impl FnOnce(&mut DynamicState),
    ) -> &mut Self {
        let old = self.dynamic_state;
        f(&mut self.dynamic_state);

        if self.dynamic_state != old {
            self.dirty |= flags;
        }

        self
    }

    pub fn set_viewport(&mut self, viewport: Viewport) -> &mut Self {
        if self.viewport != viewport {
            self.viewport = viewport;
            self.dirty |= DirtyFlags::VIEWPORT;
        }

        self
    }

    pub fn set_scissor(&mut self, scissor: Scissor) -> &mut Self {
        if self.scissor != scissor {
            self.scissor = scissor;
            self.dirty |= DirtyFlags::SCISSOR;
        }

        self
    }

    /// Sets the depth bias, which is only emitted while depth bias is enabled.
    pub fn set_depth_bias(&mut self, constant_factor: f32, slope_factor: f32) -> &mut Self {
        self.update_dynamic_state(DirtyFlags::DEPTH_BIAS, |s| {
            s.depth_bias_constant = constant_factor;
            s.depth_bias_slope = slope_factor;
        })
    }

    /// Sets the stencil state of front faces, which is only emitted while stencil testing is
    /// enabled.
    pub fn set_stencil_front_reference(
        &mut self,
        compare_mask: u8,
        write_mask: u8,
        reference: u8,
    ) -> &mut Self {
        self.update_dynamic_state(DirtyFlags::STENCIL_REFERENCE, |s| {
            s.front_compare_mask = compare_mask;
            s.front_write_mask = write_mask;
            s.front_reference = reference;
        })
    }

    /// Sets the stencil state of back faces, which is only emitted while stencil testing is
    /// enabled.
    pub fn set_stencil_back_reference(
        &mut self,
        compare_mask: u8,
        write_mask: u8,
        reference: u8,
    ) -> &mut Self {
        self.update_dynamic_state(DirtyFlags::STENCIL_REFERENCE, |s| {
            s.back_compare_mask = compare_mask;
            s.back_write_mask = write_mask;
            s.back_reference = reference;
        })
    }

    /// Sets the same stencil state for both faces.
    pub fn set_stencil_reference(
        &mut self,
        compare_mask: u8,
        write_mask: u8,
        reference: u8,
    ) -> &mut Self {
        self.set_stencil_front_reference(compare_mask, write_mask, reference)
            .set_stencil_back_reference(compare_mask, write_mask, reference)
    }
}

/// # Commands to set state that may be baked into pipelines
///
/// These values only affect the pipeline when the pipeline reads them, so changing a value that
/// the current state doesn't use does not cause the pipeline to be resolved again.
impl<R: RawCommandBuffer> RecordingCommandBuffer<R> {
    /// Returns whether the state changed.
    #[inline]
    fn update_potential_state(&mut self, f: impl FnOnce(&mut PotentialState)) -> bool {
        let old = self.potential_static_state;
        f(&mut self.potential_static_state);

        self.potential_static_state != old
    }

    pub fn set_blend_constants(&mut self, constants: [f32; 4]) -> &mut Self {
        if self.update_potential_state(|s| s.blend_constants = constants)
            && self.static_state.uses_blend_constants()
        {
            self.dirty |= DirtyFlags::STATIC_STATE;
        }

        self
    }

    /// Sets which specialization constants the recorder provides. Constants outside of the mask
    /// keep the value declared by the shader.
    ///
    /// # Panics
    ///
    /// - Panics if `mask` has bits set at or above [`NUM_SPEC_CONSTANTS`].
    pub fn set_specialization_constant_mask(&mut self, mask: u32) -> &mut Self {
        assert!(
            mask >> NUM_SPEC_CONSTANTS == 0,
            "only {} specialization constants are supported",
            NUM_SPEC_CONSTANTS,
        );

        if self.update_potential_state(|s| s.spec_constant_mask = mask) {
            self.dirty |= DirtyFlags::STATIC_STATE;
        }

        self
    }

    /// Sets the value of a specialization constant.
    ///
    /// # Panics
    ///
    /// - Panics if `index` is not below [`NUM_SPEC_CONSTANTS`].
    /// - Panics if `T` is not four bytes large.
    pub fn set_specialization_constant<T: bytemuck::Pod>(
        &mut self,
        index: u32,
        value: T,
    ) -> &mut Self {
        assert!(
            (index as usize) < NUM_SPEC_CONSTANTS,
            "specialization constant {} is out of range",
            index,
        );

        let raw: u32 = bytemuck::cast(value);

        if self.update_potential_state(|s| s.spec_constants[index as usize] = raw)
            && self.potential_static_state.spec_constant_mask & (1 << index) != 0
        {
            self.dirty |= DirtyFlags::STATIC_STATE;
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        command_buffer::DirtyFlags,
        pipeline::{BlendFactor, Viewport},
        tests::recorder,
    };

    #[test]
    fn dynamic_state_marks_only_changes() {
        let (_device, mut cb) = recorder();
        cb.clear_dirty_for_tests();

        cb.set_depth_bias(0.0, 0.0).set_stencil_reference(0, 0, 0);
        assert!(cb.dirty().is_empty());

        cb.set_stencil_reference(0xff, 0xff, 1);
        assert_eq!(cb.dirty(), DirtyFlags::STENCIL_REFERENCE);

        let viewport = Viewport {
            width: 64.0,
            height: 64.0,
            max_depth: 1.0,
            ..Default::default()
        };
        cb.set_viewport(viewport);
        assert!(cb.dirty().contains(DirtyFlags::VIEWPORT));
        assert_eq!(cb.viewport(), viewport);
    }

    #[test]
    fn blend_constants_only_dirty_when_used() {
        let (_device, mut cb) = recorder();
        cb.set_transparent_sprite_state();
        cb.clear_dirty_for_tests();

        cb.set_blend_constants([1.0, 0.0, 0.0, 1.0]);
        assert!(cb.dirty().is_empty());
        assert_eq!(cb.potential_static_state().blend_constants[0], 1.0);

        cb.set_blend_factors(BlendFactor::ConstantColor, BlendFactor::Zero);
        cb.clear_dirty_for_tests();

        cb.set_blend_constants([0.5; 4]);
        assert_eq!(cb.dirty(), DirtyFlags::STATIC_STATE);
    }

    #[test]
    fn spec_constants_only_dirty_when_masked() {
        let (_device, mut cb) = recorder();
        cb.clear_dirty_for_tests();

        cb.set_specialization_constant(2, 7u32);
        assert!(cb.dirty().is_empty());

        cb.set_specialization_constant_mask(0b100);
        assert_eq!(cb.dirty(), DirtyFlags::STATIC_STATE);
        cb.clear_dirty_for_tests();

        cb.set_specialization_constant(2, 1.5f32);
        assert_eq!(cb.dirty(), DirtyFlags::STATIC_STATE);
        assert_eq!(cb.potential_static_state().spec_constants[2], 1.5f32.to_bits());
    }

    #[test]
    fn spec_constant_out_of_range() {
        let (_device, mut cb) = recorder();

        assert_should_panic!("out of range", {
            cb.set_specialization_constant(8, 0u32);
        });
    }
}
