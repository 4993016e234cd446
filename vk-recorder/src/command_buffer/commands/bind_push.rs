use crate::{
    command_buffer::{
        DirtyFlags, RawCommandBuffer, RecordingCommandBuffer, Result, ScratchAllocator,
        ScratchUsage,
    },
    limits::{NUM_BINDINGS, NUM_DESCRIPTOR_SETS, NUM_VERTEX_ATTRIBUTES, NUM_VERTEX_BUFFERS},
    pipeline::{IndexState, IndexType, VertexAttribute, VertexInputRate},
    resource::{Buffer, BufferView, ImageView, Sampler, StockSampler},
    shader::Program,
};
use ash::vk;
use std::sync::Arc;

// Distinguishes the alternate views of an image from its float view, ids never get this large.
const UNORM_COOKIE_BIT: u64 = 1 << 63;
const SRGB_COOKIE_BIT: u64 = 1 << 62;

/// # Commands to bind objects
///
/// Resources bound to a set are only written to a descriptor set at the next draw or dispatch.
/// A binding slot holds a single descriptor. The elements of an arrayed binding occupy
/// consecutive slots, starting at the slot of the binding.
impl<R: RawCommandBuffer> RecordingCommandBuffer<R> {
    /// Binds a program for future draws or dispatches.
    ///
    /// If the new pipeline layout is not compatible with the previous one from some set onwards,
    /// that set and all the following ones are resolved again. Incompatible push constant layouts
    /// invalidate every set.
    ///
    /// # Panics
    ///
    /// - Panics if `program` is a graphics program and no render pass is active, or if it is a
    ///   compute program and a render pass is active.
    pub fn set_program(&mut self, program: &Arc<Program>) -> &mut Self {
        if self.is_compute() {
            assert!(
                program.is_compute(),
                "graphics programs can only be bound inside a render pass",
            );
        } else {
            assert!(
                !program.is_compute(),
                "compute programs cannot be bound inside a render pass",
            );
        }

        if self.program.as_ref() == Some(program) {
            return self;
        }

        self.program = Some(program.clone());
        self.current_pipeline = vk::Pipeline::null();
        self.dirty |= DirtyFlags::PIPELINE | DirtyFlags::DYNAMIC;

        let new_layout = program.layout();

        match &self.current_layout {
            None => {
                self.dirty_sets = !0;
                self.dirty |= DirtyFlags::PUSH_CONSTANTS;
            }
            Some(old_layout) if old_layout.hash() != new_layout.hash() => {
                if old_layout.push_constant_layout_hash() != new_layout.push_constant_layout_hash()
                {
                    self.dirty_sets = !0;
                    self.dirty |= DirtyFlags::PUSH_CONSTANTS;
                } else {
                    for set in 0..NUM_DESCRIPTOR_SETS as u32 {
                        let compatible = match (old_layout.allocator(set), new_layout.allocator(set))
                        {
                            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                            (None, None) => true,
                            _ => false,
                        };

                        if !compatible {
                            self.dirty_sets |= !((1 << set) - 1);
                            break;
                        }
                    }
                }
            }
            Some(_) => {}
        }

        self.current_layout = Some(new_layout.clone());

        self
    }

    fn check_binding(set: u32, binding: u32) {
        assert!(
            (set as usize) < NUM_DESCRIPTOR_SETS,
            "set {} is out of range",
            set,
        );
        assert!(
            (binding as usize) < NUM_BINDINGS,
            "binding {} is out of range",
            binding,
        );
    }

    fn set_image(
        &mut self,
        set: u32,
        binding: u32,
        float_view: vk::ImageView,
        integer_view: vk::ImageView,
        layout: vk::ImageLayout,
        cookie: u64,
    ) -> &mut Self {
        Self::check_binding(set, binding);
        let b = &mut self.bindings.sets[set as usize][binding as usize];

        if b.cookie == cookie && b.image_float.image_layout == layout {
            return self;
        }

        b.image_float.image_view = float_view;
        b.image_float.image_layout = layout;
        b.image_integer.image_view = integer_view;
        b.image_integer.image_layout = layout;
        b.cookie = cookie;
        self.dirty_sets |= 1 << set;

        self
    }

    /// Binds an image to be sampled, without changing the sampler of the slot.
    ///
    /// This is all that is needed for separate images and for bindings with an immutable
    /// sampler.
    pub fn set_texture(&mut self, set: u32, binding: u32, view: &ImageView) -> &mut Self {
        self.set_image(
            set,
            binding,
            view.float_view(),
            view.integer_view(),
            view.read_only_layout(),
            view.cookie(),
        )
    }

    pub fn set_texture_with_sampler(
        &mut self,
        set: u32,
        binding: u32,
        view: &ImageView,
        sampler: &Sampler,
    ) -> &mut Self {
        self.set_texture(set, binding, view)
            .set_sampler(set, binding, sampler)
    }

    pub fn set_texture_with_stock_sampler(
        &mut self,
        set: u32,
        binding: u32,
        view: &ImageView,
        sampler: StockSampler,
    ) -> &mut Self {
        let device = self.pipeline_cache.device().clone();

        self.set_texture_with_sampler(set, binding, view, device.stock_sampler(sampler))
    }

    /// Binds the unorm view of an image, to read an sRGB image without conversion.
    pub fn set_unorm_texture(&mut self, set: u32, binding: u32, view: &ImageView) -> &mut Self {
        self.set_image(
            set,
            binding,
            view.unorm_view(),
            view.unorm_view(),
            view.read_only_layout(),
            view.cookie() | UNORM_COOKIE_BIT,
        )
    }

    /// Binds the sRGB view of an image, to read a unorm image with conversion.
    pub fn set_srgb_texture(&mut self, set: u32, binding: u32, view: &ImageView) -> &mut Self {
        self.set_image(
            set,
            binding,
            view.srgb_view(),
            view.srgb_view(),
            view.read_only_layout(),
            view.cookie() | SRGB_COOKIE_BIT,
        )
    }

    /// Binds an image as a storage image, in the general layout.
    pub fn set_storage_texture(&mut self, set: u32, binding: u32, view: &ImageView) -> &mut Self {
        self.set_image(
            set,
            binding,
            view.float_view(),
            view.integer_view(),
            vk::ImageLayout::GENERAL,
            view.cookie(),
        )
    }

    pub fn set_sampler(&mut self, set: u32, binding: u32, sampler: &Sampler) -> &mut Self {
        Self::check_binding(set, binding);
        let b = &mut self.bindings.sets[set as usize][binding as usize];

        if b.secondary_cookie == sampler.cookie() {
            return self;
        }

        b.image_float.sampler = sampler.handle();
        b.image_integer.sampler = sampler.handle();
        b.secondary_cookie = sampler.cookie();
        self.dirty_sets |= 1 << set;

        self
    }

    pub fn set_stock_sampler(
        &mut self,
        set: u32,
        binding: u32,
        sampler: StockSampler,
    ) -> &mut Self {
        let device = self.pipeline_cache.device().clone();

        self.set_sampler(set, binding, device.stock_sampler(sampler))
    }

    /// Binds a range of a uniform buffer.
    ///
    /// Uniform buffers are bound with a dynamic offset. Binding the same buffer with the same
    /// range at a different offset doesn't need a new descriptor set, only binding the set again.
    ///
    /// # Panics
    ///
    /// - Panics if the range is out of the bounds of `buffer`.
    /// - Panics if `offset` doesn't fit in 32 bits.
    pub fn set_uniform_buffer(
        &mut self,
        set: u32,
        binding: u32,
        buffer: &Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    ) -> &mut Self {
        Self::check_binding(set, binding);
        assert!(
            offset + range <= buffer.size(),
            "the range is out of the bounds of the buffer",
        );
        let offset = u32::try_from(offset)
            .unwrap_or_else(|_| panic!("dynamic offset {} doesn't fit in 32 bits", offset));

        let b = &mut self.bindings.sets[set as usize][binding as usize];

        if b.cookie == buffer.cookie() && b.buffer.offset == 0 && b.buffer.range == range {
            if b.dynamic_offset != offset {
                b.dynamic_offset = offset;
                self.dirty_sets_dynamic |= 1 << set;
            }
        } else {
            b.buffer = vk::DescriptorBufferInfo {
                buffer: buffer.handle(),
                offset: 0,
                range,
            };
            b.dynamic_offset = offset;
            b.cookie = buffer.cookie();
            b.secondary_cookie = 0;
            self.dirty_sets |= 1 << set;
        }

        self
    }

    /// Binds a range of a storage buffer.
    ///
    /// # Panics
    ///
    /// - Panics if the range is out of the bounds of `buffer`.
    pub fn set_storage_buffer(
        &mut self,
        set: u32,
        binding: u32,
        buffer: &Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    ) -> &mut Self {
        Self::check_binding(set, binding);
        assert!(
            offset + range <= buffer.size(),
            "the range is out of the bounds of the buffer",
        );

        let b = &mut self.bindings.sets[set as usize][binding as usize];

        if b.cookie == buffer.cookie()
            && b.buffer.offset == offset
            && b.buffer.range == range
            && b.dynamic_offset == 0
        {
            return self;
        }

        b.buffer = vk::DescriptorBufferInfo {
            buffer: buffer.handle(),
            offset,
            range,
        };
        b.dynamic_offset = 0;
        b.cookie = buffer.cookie();
        b.secondary_cookie = 0;
        self.dirty_sets |= 1 << set;

        self
    }

    pub fn set_buffer_view(&mut self, set: u32, binding: u32, view: &BufferView) -> &mut Self {
        Self::check_binding(set, binding);
        let b = &mut self.bindings.sets[set as usize][binding as usize];

        if b.cookie == view.cookie() {
            return self;
        }

        b.buffer_view = view.handle();
        b.cookie = view.cookie();
        b.secondary_cookie = 0;
        self.dirty_sets |= 1 << set;

        self
    }

    /// Binds the input attachments of the current subpass to consecutive slots of `set`,
    /// starting at `first_binding`.
    ///
    /// # Panics
    ///
    /// - Panics if no render pass is active.
    pub fn set_input_attachments(&mut self, set: u32, first_binding: u32) -> &mut Self {
        let Some(state) = &self.render_pass else {
            panic!("input attachments can only be bound inside a render pass");
        };
        let subpass = state
            .render_pass
            .subpass(state.subpass_index)
            .unwrap_or_else(|| unreachable!());

        for (i, &attachment) in subpass.input_attachments.iter().enumerate() {
            let binding = first_binding + i as u32;
            Self::check_binding(set, binding);

            let view = &state.attachments[attachment as usize];
            let layout = view.read_only_layout();
            let b = &mut self.bindings.sets[set as usize][binding as usize];

            if b.cookie == view.cookie() && b.image_float.image_layout == layout {
                continue;
            }

            b.image_float.image_view = view.float_view();
            b.image_float.image_layout = layout;
            b.image_integer.image_view = view.integer_view();
            b.image_integer.image_layout = layout;
            b.cookie = view.cookie();
            self.dirty_sets |= 1 << set;
        }

        self
    }

    /// Binds a descriptor set allocated from a bindless pool to a set whose layout is bindless.
    pub fn set_bindless(&mut self, set: u32, descriptor_set: vk::DescriptorSet) -> &mut Self {
        Self::check_binding(set, 0);

        self.bindless_sets[set as usize] = descriptor_set;
        self.dirty_sets |= 1 << set;

        self
    }

    /// Sets where a vertex attribute is read from.
    ///
    /// # Panics
    ///
    /// - Panics if `attribute` or `binding` is out of range.
    pub fn set_vertex_attribute(
        &mut self,
        attribute: u32,
        binding: u32,
        format: vk::Format,
        offset: u32,
    ) -> &mut Self {
        assert!(
            (attribute as usize) < NUM_VERTEX_ATTRIBUTES,
            "vertex attribute {} is out of range",
            attribute,
        );
        assert!(
            (binding as usize) < NUM_VERTEX_BUFFERS,
            "vertex buffer binding {} is out of range",
            binding,
        );

        let attribute_state = VertexAttribute {
            binding,
            format,
            offset,
        };

        if self.attributes[attribute as usize] != attribute_state {
            self.attributes[attribute as usize] = attribute_state;
            self.dirty |= DirtyFlags::STATIC_VERTEX;
        }

        self
    }

    /// Binds a vertex buffer. Its stride and input rate are part of the pipeline.
    ///
    /// # Panics
    ///
    /// - Panics if `binding` is out of range.
    pub fn set_vertex_binding(
        &mut self,
        binding: u32,
        buffer: &Buffer,
        offset: vk::DeviceSize,
        stride: u32,
        input_rate: VertexInputRate,
    ) -> &mut Self {
        assert!(
            (binding as usize) < NUM_VERTEX_BUFFERS,
            "vertex buffer binding {} is out of range",
            binding,
        );
        let b = binding as usize;

        if self.vertex_buffers[b] != buffer.handle() || self.vertex_offsets[b] != offset {
            self.dirty_vertex_buffers |= 1 << binding;
        }

        if self.strides[b] != stride || self.input_rates[b] != input_rate {
            self.dirty |= DirtyFlags::STATIC_VERTEX;
        }

        self.vertex_buffers[b] = buffer.handle();
        self.vertex_offsets[b] = offset;
        self.strides[b] = stride;
        self.input_rates[b] = input_rate;

        self
    }

    /// Binds an index buffer, which is emitted right away.
    pub fn set_index_buffer(
        &mut self,
        buffer: &Buffer,
        offset: vk::DeviceSize,
        index_type: IndexType,
    ) -> &mut Self {
        let index = IndexState {
            buffer: buffer.handle(),
            offset,
            index_type,
        };

        if self.index == index {
            return self;
        }

        self.index = index;
        self.inner
            .bind_index_buffer(index.buffer, index.offset, index_type.into());

        self
    }

    /// Updates the push constant block at `offset`. The block is pushed before the next draw or
    /// dispatch.
    ///
    /// # Panics
    ///
    /// - Panics if the data runs past the end of the push constant block.
    pub fn push_constants<T: bytemuck::NoUninit>(&mut self, offset: u32, data: &T) -> &mut Self {
        let data = bytemuck::bytes_of(data);
        let range = offset as usize..offset as usize + data.len();
        assert!(
            range.end <= self.bindings.push_constant_data.len(),
            "the push constant data runs past the end of the block",
        );

        if self.bindings.push_constant_data[range.clone()] != *data {
            self.bindings.push_constant_data[range].copy_from_slice(data);
            self.dirty |= DirtyFlags::PUSH_CONSTANTS;
        }

        self
    }

    fn scratch_allocator(&mut self) -> &mut dyn ScratchAllocator {
        match &mut self.scratch_allocator {
            Some(allocator) => allocator.as_mut(),
            None => panic!("the command buffer has no scratch allocator"),
        }
    }

    /// Copies `data` into scratch memory and binds it as a uniform buffer.
    ///
    /// # Panics
    ///
    /// - Panics if the command buffer was created without a scratch allocator.
    pub fn allocate_constant_data(
        &mut self,
        set: u32,
        binding: u32,
        data: &[u8],
    ) -> Result<&mut Self> {
        let allocation = self.scratch_allocator().allocate(ScratchUsage::Uniform, data)?;

        Ok(self.set_uniform_buffer(
            set,
            binding,
            &allocation.buffer,
            allocation.offset,
            allocation.size,
        ))
    }

    /// Copies `data` into scratch memory and binds it as a vertex buffer.
    ///
    /// # Panics
    ///
    /// - Panics if the command buffer was created without a scratch allocator.
    pub fn allocate_vertex_data(
        &mut self,
        binding: u32,
        data: &[u8],
        stride: u32,
        input_rate: VertexInputRate,
    ) -> Result<&mut Self> {
        let allocation = self.scratch_allocator().allocate(ScratchUsage::Vertex, data)?;

        Ok(self.set_vertex_binding(
            binding,
            &allocation.buffer,
            allocation.offset,
            stride,
            input_rate,
        ))
    }

    /// Copies `data` into scratch memory and binds it as the index buffer.
    ///
    /// # Panics
    ///
    /// - Panics if the command buffer was created without a scratch allocator.
    pub fn allocate_index_data(&mut self, data: &[u8], index_type: IndexType) -> Result<&mut Self> {
        let allocation = self.scratch_allocator().allocate(ScratchUsage::Index, data)?;

        Ok(self.set_index_buffer(&allocation.buffer, allocation.offset, index_type))
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        command_buffer::DirtyFlags,
        descriptor_set::DescriptorSetLayout,
        pipeline::{CombinedResourceLayout, IndexType},
        resource::{Buffer, BufferView},
        tests::{compute_program, recorder, test_image_view, Command},
        Handle,
    };
    use ash::vk;

    fn buffer() -> Buffer {
        Buffer::new(vk::Buffer::from_raw(0x100), 1024)
    }

    #[test]
    fn rebinding_is_not_a_change() {
        let (_device, mut cb) = recorder();
        let view = test_image_view();
        let buffer = buffer();
        cb.clear_dirty_for_tests();

        cb.set_texture(0, 1, &view)
            .set_storage_buffer(1, 0, &buffer, 0, 64);
        assert_eq!(cb.dirty_sets(), 0b11);
        cb.clear_dirty_for_tests();

        cb.set_texture(0, 1, &view)
            .set_storage_buffer(1, 0, &buffer, 0, 64);
        assert_eq!(cb.dirty_sets(), 0);

        cb.set_storage_texture(0, 1, &view);
        assert_eq!(cb.dirty_sets(), 0b1);
        cb.clear_dirty_for_tests();

        cb.set_srgb_texture(0, 1, &view);
        assert_eq!(cb.dirty_sets(), 0b1);
    }

    #[test]
    fn uniform_offset_is_dynamic() {
        let (_device, mut cb) = recorder();
        let buffer = buffer();
        cb.clear_dirty_for_tests();

        cb.set_uniform_buffer(2, 0, &buffer, 0, 256);
        assert_eq!(cb.dirty_sets(), 0b100);
        cb.clear_dirty_for_tests();

        cb.set_uniform_buffer(2, 0, &buffer, 256, 256);
        assert_eq!(cb.dirty_sets(), 0);
        assert_eq!(cb.dirty_sets_dynamic(), 0b100);

        cb.set_uniform_buffer(2, 0, &buffer, 256, 128);
        assert_eq!(cb.dirty_sets(), 0b100);
    }

    #[test]
    fn rebinding_to_another_kind_of_resource() {
        let (_device, mut cb) = recorder();
        let view = test_image_view();
        let buffer_view = BufferView::new(vk::BufferView::from_raw(0x200));
        cb.clear_dirty_for_tests();

        cb.set_texture(0, 0, &view);
        assert_eq!(cb.dirty_sets(), 0b1);
        cb.clear_dirty_for_tests();

        cb.set_buffer_view(0, 0, &buffer_view);
        assert_eq!(cb.dirty_sets(), 0b1);
        cb.clear_dirty_for_tests();

        cb.set_texture(0, 0, &view);
        assert_eq!(cb.dirty_sets(), 0b1);
    }

    #[test]
    fn uniform_after_storage_binding_of_the_same_range() {
        let (_device, mut cb) = recorder();
        let buffer = buffer();

        cb.set_storage_buffer(0, 0, &buffer, 256, 64);
        cb.clear_dirty_for_tests();

        cb.set_uniform_buffer(0, 0, &buffer, 0, 64);
        assert_eq!(cb.dirty_sets(), 0b1);

        let b = &cb.bindings.sets[0][0];
        assert_eq!(b.buffer.offset, 0);
        assert_eq!(b.dynamic_offset, 0);

        cb.set_uniform_buffer(0, 0, &buffer, 256, 64);
        cb.clear_dirty_for_tests();

        cb.set_storage_buffer(0, 0, &buffer, 0, 64);
        assert_eq!(cb.dirty_sets(), 0b1);

        let b = &cb.bindings.sets[0][0];
        assert_eq!(b.buffer.offset, 0);
        assert_eq!(b.dynamic_offset, 0);
    }

    #[test]
    fn binding_out_of_range() {
        let (_device, mut cb) = recorder();
        let view = test_image_view();

        assert_should_panic!("binding 32 is out of range", {
            cb.set_texture(0, 32, &view);
        });
    }

    #[test]
    fn buffer_range_out_of_bounds() {
        let (_device, mut cb) = recorder();
        let buffer = buffer();

        assert_should_panic!("out of the bounds", {
            cb.set_storage_buffer(0, 0, &buffer, 1000, 64);
        });
    }

    #[test]
    fn program_layout_compatibility() {
        let (device, mut cb) = recorder();

        let mut a = CombinedResourceLayout::default();
        a.descriptor_set_mask = 0b111;
        a.sets[0].storage_buffer_mask = 1;
        a.sets[1].storage_buffer_mask = 1;
        a.sets[2].storage_buffer_mask = 1;
        for set in 0..3 {
            a.stages_for_bindings[set][0] = vk::ShaderStageFlags::COMPUTE;
        }

        let mut b = a.clone();
        b.sets[1] = DescriptorSetLayout {
            uniform_buffer_mask: 1,
            ..Default::default()
        };

        let program_a = compute_program(&device, a);
        let program_b = compute_program(&device, b);

        cb.set_program(&program_a);
        cb.clear_dirty_for_tests();

        cb.set_program(&program_b);
        assert_eq!(cb.dirty_sets() & 0b111, 0b110);
        assert!(cb.dirty().contains(DirtyFlags::PIPELINE));
        assert!(!cb.dirty().contains(DirtyFlags::PUSH_CONSTANTS));
    }

    #[test]
    fn index_buffer_is_emitted_once() {
        let (_device, mut cb) = recorder();
        let buffer = buffer();

        cb.set_index_buffer(&buffer, 0, IndexType::Uint16)
            .set_index_buffer(&buffer, 0, IndexType::Uint16);

        let binds = cb
            .inner()
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::BindIndexBuffer { .. }))
            .count();
        assert_eq!(binds, 1);
    }

    #[test]
    fn push_constants_mark_changes() {
        let (_device, mut cb) = recorder();
        cb.clear_dirty_for_tests();

        cb.push_constants(0, &[0u32; 4]);
        assert!(cb.dirty().is_empty());

        cb.push_constants(4, &1.0f32);
        assert_eq!(cb.dirty(), DirtyFlags::PUSH_CONSTANTS);

        assert_should_panic!("past the end", {
            cb.push_constants(124, &[0u32; 2]);
        });
    }

    #[test]
    fn scratch_data() {
        let (_device, mut cb) = recorder();

        cb.allocate_constant_data(0, 3, &[1, 2, 3, 4]).unwrap();
        assert_eq!(cb.dirty_sets() & 1, 1);

        cb.allocate_index_data(&[0; 12], IndexType::Uint32).unwrap();
        assert!(cb
            .inner()
            .commands()
            .iter()
            .any(|c| matches!(c, Command::BindIndexBuffer { .. })));
    }
}
