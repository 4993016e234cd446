use crate::{
    bits::{iter_bit_ranges, iter_bits},
    command_buffer::{DirtyFlags, RawCommandBuffer, RecordingCommandBuffer, Result},
    pipeline::{DeferredPipelineCompile, PipelineCompileMode, PipelineLayout},
    resource::Buffer,
};
use ash::vk::{self, Handle};

/// # Commands to execute a bound pipeline
///
/// Before the command itself is emitted, everything it depends on is resolved from the recorder
/// state. If the pipeline is not ready yet because it is compiled without blocking, nothing is
/// emitted, the command is skipped and the state stays dirty for the next one.
impl<R: RawCommandBuffer> RecordingCommandBuffer<R> {
    /// Draws non-indexed vertices.
    ///
    /// # Panics
    ///
    /// - Panics if no render pass is active.
    /// - Panics if no program is bound.
    /// - Panics if a resource read by the program or a vertex buffer it reads is not bound.
    pub fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<&mut Self> {
        if self.flush_render_state(self.compile_mode)? {
            self.inner
                .draw(vertex_count, instance_count, first_vertex, first_instance);
        } else {
            tracing::trace!("pipeline is not ready, skipping draw");
        }

        Ok(self)
    }

    /// Draws indexed vertices, using the bound index buffer.
    ///
    /// # Panics
    ///
    /// - Panics if no index buffer is bound.
    /// - Panics for the same reasons as [`draw`].
    ///
    /// [`draw`]: Self::draw
    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Result<&mut Self> {
        assert!(!self.index.buffer.is_null(), "no index buffer is bound");

        if self.flush_render_state(self.compile_mode)? {
            self.inner.draw_indexed(
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        } else {
            tracing::trace!("pipeline is not ready, skipping indexed draw");
        }

        Ok(self)
    }

    /// Draws non-indexed vertices, reading the parameters from a buffer.
    ///
    /// # Panics
    ///
    /// - Panics for the same reasons as [`draw`].
    ///
    /// [`draw`]: Self::draw
    pub fn draw_indirect(
        &mut self,
        buffer: &Buffer,
        offset: vk::DeviceSize,
        draw_count: u32,
        stride: u32,
    ) -> Result<&mut Self> {
        if self.flush_render_state(self.compile_mode)? {
            self.inner
                .draw_indirect(buffer.handle(), offset, draw_count, stride);
        } else {
            tracing::trace!("pipeline is not ready, skipping indirect draw");
        }

        Ok(self)
    }

    /// Draws indexed vertices, reading the parameters from a buffer.
    ///
    /// # Panics
    ///
    /// - Panics for the same reasons as [`draw_indexed`].
    ///
    /// [`draw_indexed`]: Self::draw_indexed
    pub fn draw_indexed_indirect(
        &mut self,
        buffer: &Buffer,
        offset: vk::DeviceSize,
        draw_count: u32,
        stride: u32,
    ) -> Result<&mut Self> {
        assert!(!self.index.buffer.is_null(), "no index buffer is bound");

        if self.flush_render_state(self.compile_mode)? {
            self.inner
                .draw_indexed_indirect(buffer.handle(), offset, draw_count, stride);
        } else {
            tracing::trace!("pipeline is not ready, skipping indexed indirect draw");
        }

        Ok(self)
    }

    /// Dispatches compute work.
    ///
    /// # Panics
    ///
    /// - Panics if a render pass is active.
    /// - Panics if no program is bound.
    /// - Panics if a resource read by the program is not bound.
    pub fn dispatch(
        &mut self,
        group_count_x: u32,
        group_count_y: u32,
        group_count_z: u32,
    ) -> Result<&mut Self> {
        if self.flush_compute_state(self.compile_mode)? {
            self.inner
                .dispatch(group_count_x, group_count_y, group_count_z);
        } else {
            tracing::trace!("pipeline is not ready, skipping dispatch");
        }

        Ok(self)
    }

    /// Dispatches compute work, reading the group counts from a buffer.
    ///
    /// # Panics
    ///
    /// - Panics for the same reasons as [`dispatch`].
    ///
    /// [`dispatch`]: Self::dispatch
    pub fn dispatch_indirect(
        &mut self,
        buffer: &Buffer,
        offset: vk::DeviceSize,
    ) -> Result<&mut Self> {
        if self.flush_compute_state(self.compile_mode)? {
            self.inner.dispatch_indirect(buffer.handle(), offset);
        } else {
            tracing::trace!("pipeline is not ready, skipping indirect dispatch");
        }

        Ok(self)
    }

    /// Resolves the state the next draw or dispatch would need, without waiting for the
    /// pipeline to be compiled, regardless of the compile mode of the command buffer.
    ///
    /// Returns whether the pipeline is ready.
    ///
    /// # Panics
    ///
    /// - Panics if no program is bound.
    pub fn flush_pipeline_state_without_blocking(&mut self) -> Result<bool> {
        if self.is_compute() {
            self.flush_compute_state(PipelineCompileMode::NonBlocking)
        } else {
            self.flush_render_state(PipelineCompileMode::NonBlocking)
        }
    }

    fn flush_render_state(&mut self, mode: PipelineCompileMode) -> Result<bool> {
        let Some(state) = &self.render_pass else {
            panic!("draws must be recorded inside a render pass");
        };
        let Some(program) = &self.program else {
            panic!("no program is bound");
        };
        let layout = program.layout().clone();

        if self.dirty.intersects(DirtyFlags::PIPELINE_STATE) {
            let consumed = self.dirty & DirtyFlags::PIPELINE_STATE;
            self.dirty -= consumed;

            let compile = DeferredPipelineCompile::graphics(
                program.clone(),
                state.render_pass.clone(),
                state.subpass_index,
                &self.static_state,
                &self.potential_static_state,
                &self.attributes,
                &self.strides,
                &self.input_rates,
            );
            self.active_vertex_buffers = compile.active_vertex_buffers();
            self.resolve_pipeline(&compile, mode, consumed)?;
        }

        if self.current_pipeline.is_null() {
            return Ok(false);
        }

        self.flush_descriptor_sets(&layout)?;
        self.flush_push_constants(&layout);
        self.flush_dynamic_state();
        self.flush_vertex_buffers();

        Ok(true)
    }

    fn flush_compute_state(&mut self, mode: PipelineCompileMode) -> Result<bool> {
        assert!(
            self.render_pass.is_none(),
            "dispatches must be recorded outside of a render pass",
        );
        let Some(program) = &self.program else {
            panic!("no program is bound");
        };
        let layout = program.layout().clone();

        let pipeline_flags = DirtyFlags::STATIC_STATE | DirtyFlags::PIPELINE;

        if self.dirty.intersects(pipeline_flags) {
            let consumed = self.dirty & pipeline_flags;
            self.dirty -= consumed;

            let compile = DeferredPipelineCompile::compute(
                program.clone(),
                &self.static_state,
                &self.potential_static_state,
            );
            self.resolve_pipeline(&compile, mode, consumed)?;
        }

        if self.current_pipeline.is_null() {
            return Ok(false);
        }

        self.flush_descriptor_sets(&layout)?;
        self.flush_push_constants(&layout);

        Ok(true)
    }

    /// Looks up the pipeline and binds it if it changed. When no pipeline comes out of it, the
    /// `consumed` flags are marked dirty again.
    fn resolve_pipeline(
        &mut self,
        compile: &DeferredPipelineCompile,
        mode: PipelineCompileMode,
        consumed: DirtyFlags,
    ) -> Result {
        let bind_point = self.bind_point();
        let old_pipeline = self.current_pipeline;

        let pipeline = match self.pipeline_cache.resolve(compile, mode) {
            Ok(Some(pipeline)) => pipeline,
            Ok(None) => {
                self.current_pipeline = vk::Pipeline::null();
                self.dirty |= consumed;

                return Ok(());
            }
            Err(err) => {
                tracing::error!(
                    hash = format_args!("{:016x}", compile.hash()),
                    %err,
                    "failed to resolve pipeline",
                );
                self.current_pipeline = vk::Pipeline::null();
                self.dirty |= consumed;

                return Err(err);
            }
        };

        self.current_pipeline = pipeline;

        if pipeline != old_pipeline {
            self.inner.bind_pipeline(bind_point, pipeline);
            self.dirty |= DirtyFlags::DYNAMIC;
        }

        Ok(())
    }

    fn flush_push_constants(&mut self, layout: &PipelineLayout) {
        if !self.dirty.intersects(DirtyFlags::PUSH_CONSTANTS) {
            return;
        }

        self.dirty -= DirtyFlags::PUSH_CONSTANTS;

        let range = layout.resource_layout().push_constant_range;

        if range.size != 0 {
            let data = &self.bindings.push_constant_data
                [range.offset as usize..(range.offset + range.size) as usize];
            self.inner
                .push_constants(layout.handle(), range.stage_flags, range.offset, data);
        }
    }

    fn flush_dynamic_state(&mut self) {
        if self.dirty.intersects(DirtyFlags::VIEWPORT) {
            self.dirty -= DirtyFlags::VIEWPORT;
            self.inner.set_viewport(self.viewport.into());
        }

        if self.dirty.intersects(DirtyFlags::SCISSOR) {
            self.dirty -= DirtyFlags::SCISSOR;
            self.inner.set_scissor(self.scissor.into());
        }

        // Depth bias and stencil state stay dirty until they are used.
        if self.static_state.depth_bias_enable && self.dirty.intersects(DirtyFlags::DEPTH_BIAS) {
            self.dirty -= DirtyFlags::DEPTH_BIAS;
            self.inner.set_depth_bias(
                self.dynamic_state.depth_bias_constant,
                self.dynamic_state.depth_bias_slope,
            );
        }

        if self.static_state.stencil_test && self.dirty.intersects(DirtyFlags::STENCIL_REFERENCE) {
            self.dirty -= DirtyFlags::STENCIL_REFERENCE;

            let s = self.dynamic_state;
            let front = vk::StencilFaceFlags::FRONT;
            let back = vk::StencilFaceFlags::BACK;

            self.inner
                .set_stencil_compare_mask(front, s.front_compare_mask.into());
            self.inner
                .set_stencil_write_mask(front, s.front_write_mask.into());
            self.inner
                .set_stencil_reference(front, s.front_reference.into());
            self.inner
                .set_stencil_compare_mask(back, s.back_compare_mask.into());
            self.inner
                .set_stencil_write_mask(back, s.back_write_mask.into());
            self.inner
                .set_stencil_reference(back, s.back_reference.into());
        }
    }

    fn flush_vertex_buffers(&mut self) {
        let update = self.dirty_vertex_buffers & self.active_vertex_buffers;

        for binding in iter_bits(update) {
            assert!(
                !self.vertex_buffers[binding as usize].is_null(),
                "no vertex buffer is bound to binding {}",
                binding,
            );
        }

        for (first, count) in iter_bit_ranges(update) {
            let range = first as usize..(first + count) as usize;
            self.inner.bind_vertex_buffers(
                first,
                &self.vertex_buffers[range.clone()],
                &self.vertex_offsets[range],
            );
        }

        self.dirty_vertex_buffers &= !update;
    }
}
