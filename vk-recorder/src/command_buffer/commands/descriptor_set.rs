use crate::{
    bits::iter_bits,
    command_buffer::{bindings::ResourceBinding, RawCommandBuffer, RecordingCommandBuffer, Result},
    descriptor_set::DescriptorSetLayout,
    device::{DescriptorInfo, DescriptorWrite},
    hash::{Hash, Hasher},
    limits::NUM_BINDINGS,
    pipeline::PipelineLayout,
};
use ash::vk::{self, Handle};
use smallvec::SmallVec;
use std::sync::Arc;

impl<R: RawCommandBuffer> RecordingCommandBuffer<R> {
    /// Resolves and binds every dirty set used by the current program, then binds again the
    /// sets whose dynamic offsets changed.
    pub(in crate::command_buffer) fn flush_descriptor_sets(
        &mut self,
        layout: &Arc<PipelineLayout>,
    ) -> Result {
        let set_mask = layout.resource_layout().descriptor_set_mask;

        for set in iter_bits(set_mask & self.dirty_sets) {
            self.flush_descriptor_set(layout, set)?;

            // A resolved set is bound with its current dynamic offsets.
            self.dirty_sets &= !(1 << set);
            self.dirty_sets_dynamic &= !(1 << set);
        }

        for set in iter_bits(set_mask & self.dirty_sets_dynamic) {
            self.rebind_descriptor_set(layout, set);
            self.dirty_sets_dynamic &= !(1 << set);
        }

        Ok(())
    }

    fn flush_descriptor_set(&mut self, layout: &Arc<PipelineLayout>, set: u32) -> Result {
        let bind_point = self.bind_point();
        let set_layout = &layout.resource_layout().sets[set as usize];

        if set_layout.is_bindless() {
            let descriptor_set = self.bindless_sets[set as usize];
            assert!(
                !descriptor_set.is_null(),
                "set {} has a bindless layout, but no bindless set is bound to it",
                set,
            );

            self.inner
                .bind_descriptor_set(bind_point, layout.handle(), set, descriptor_set, &[]);
            self.allocated_sets[set as usize] = descriptor_set;

            return Ok(());
        }

        let bindings = &self.bindings.sets[set as usize];
        let hash = hash_descriptor_set(set, set_layout, bindings);

        let allocator = layout.set_allocator(set);
        let (descriptor_set, present) = allocator.find(self.thread_index, hash)?;

        if !present {
            let writes = descriptor_writes(set_layout, bindings);
            allocator.device().update_descriptor_set(descriptor_set, &writes);
        }

        let dynamic_offsets = dynamic_offsets(set_layout, bindings);
        self.inner.bind_descriptor_set(
            bind_point,
            layout.handle(),
            set,
            descriptor_set,
            &dynamic_offsets,
        );
        self.allocated_sets[set as usize] = descriptor_set;

        Ok(())
    }

    fn rebind_descriptor_set(&mut self, layout: &Arc<PipelineLayout>, set: u32) {
        let bind_point = self.bind_point();
        let set_layout = &layout.resource_layout().sets[set as usize];
        let dynamic_offsets = dynamic_offsets(set_layout, &self.bindings.sets[set as usize]);

        self.inner.bind_descriptor_set(
            bind_point,
            layout.handle(),
            set,
            self.allocated_sets[set as usize],
            &dynamic_offsets,
        );
    }
}

/// Calls `f` with the slot of every descriptor of the bindings in `mask`.
fn for_each_descriptor(
    layout: &DescriptorSetLayout,
    mask: u32,
    mut f: impl FnMut(u32, u32, usize),
) {
    for binding in iter_bits(mask) {
        for element in 0..layout.descriptor_count(binding) {
            let slot = (binding + element) as usize;
            assert!(
                slot < NUM_BINDINGS,
                "element {} of binding {} is out of range",
                element,
                binding,
            );

            f(binding, element, slot);
        }
    }
}

fn dynamic_offsets(
    layout: &DescriptorSetLayout,
    bindings: &[ResourceBinding; NUM_BINDINGS],
) -> SmallVec<[u32; 8]> {
    let mut offsets = SmallVec::new();

    for_each_descriptor(layout, layout.uniform_buffer_mask, |_, _, slot| {
        offsets.push(bindings[slot].dynamic_offset);
    });

    offsets
}

fn image_info(
    layout: &DescriptorSetLayout,
    binding: u32,
    b: &ResourceBinding,
) -> vk::DescriptorImageInfo {
    if layout.fp_mask & (1 << binding) != 0 {
        b.image_float
    } else {
        b.image_integer
    }
}

/// Hashes what a set's descriptors would be written with. Two sets with the same hash hold the
/// same descriptors.
///
/// # Panics
///
/// - Panics if a descriptor the layout declares is not bound.
fn hash_descriptor_set(
    set: u32,
    layout: &DescriptorSetLayout,
    bindings: &[ResourceBinding; NUM_BINDINGS],
) -> Hash {
    fn unbound(kind: &str, set: u32, binding: u32, element: u32) -> ! {
        panic!(
            "no {} is bound to element {} of binding {} of set {}",
            kind, element, binding, set,
        )
    }

    let mut h = Hasher::new();
    h.u32(layout.fp_mask);

    for_each_descriptor(layout, layout.uniform_buffer_mask, |binding, element, slot| {
        let b = &bindings[slot];
        if !b.is_buffer_bound() {
            unbound("uniform buffer", set, binding, element);
        }

        // The offset is dynamic, only the range is part of the descriptor.
        h.u64(b.cookie);
        h.u64(b.buffer.range);
    });

    for_each_descriptor(layout, layout.storage_buffer_mask, |binding, element, slot| {
        let b = &bindings[slot];
        if !b.is_buffer_bound() {
            unbound("storage buffer", set, binding, element);
        }

        h.u64(b.cookie);
        h.u64(b.buffer.offset);
        h.u64(b.buffer.range);
    });

    for_each_descriptor(layout, layout.sampled_texel_buffer_mask, |binding, element, slot| {
        let b = &bindings[slot];
        if b.buffer_view.is_null() {
            unbound("buffer view", set, binding, element);
        }

        h.u64(b.cookie);
    });

    for_each_descriptor(layout, layout.sampled_image_mask, |binding, element, slot| {
        let b = &bindings[slot];
        let immutable = layout.has_immutable_sampler(binding);
        if b.image_float.image_view.is_null() {
            unbound("image", set, binding, element);
        }
        if !immutable && b.image_float.sampler.is_null() {
            unbound("sampler", set, binding, element);
        }

        h.u64(b.cookie);
        if !immutable {
            h.u64(b.secondary_cookie);
        }
        h.s32(b.image_float.image_layout.as_raw());
    });

    for_each_descriptor(layout, layout.separate_image_mask, |binding, element, slot| {
        let b = &bindings[slot];
        if b.image_float.image_view.is_null() {
            unbound("image", set, binding, element);
        }

        h.u64(b.cookie);
        h.s32(b.image_float.image_layout.as_raw());
    });

    for_each_descriptor(
        layout,
        layout.sampler_mask & !layout.immutable_sampler_mask,
        |binding, element, slot| {
            let b = &bindings[slot];
            if b.image_float.sampler.is_null() {
                unbound("sampler", set, binding, element);
            }

            h.u64(b.secondary_cookie);
        },
    );

    for_each_descriptor(layout, layout.storage_image_mask, |binding, element, slot| {
        let b = &bindings[slot];
        if b.image_float.image_view.is_null() {
            unbound("storage image", set, binding, element);
        }

        h.u64(b.cookie);
    });

    for_each_descriptor(layout, layout.input_attachment_mask, |binding, element, slot| {
        let b = &bindings[slot];
        if b.image_float.image_view.is_null() {
            unbound("input attachment", set, binding, element);
        }

        h.u64(b.cookie);
        h.s32(b.image_float.image_layout.as_raw());
    });

    h.get()
}

/// Builds the writes filling every descriptor of a freshly allocated set.
fn descriptor_writes(
    layout: &DescriptorSetLayout,
    bindings: &[ResourceBinding; NUM_BINDINGS],
) -> SmallVec<[DescriptorWrite; NUM_BINDINGS]> {
    let mut writes = SmallVec::new();
    let mut write = |binding, array_element, descriptor_type, info| {
        writes.push(DescriptorWrite {
            binding,
            array_element,
            descriptor_type,
            info,
        });
    };

    for_each_descriptor(layout, layout.uniform_buffer_mask, |binding, element, slot| {
        write(
            binding,
            element,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            DescriptorInfo::Buffer(bindings[slot].buffer),
        );
    });

    for_each_descriptor(layout, layout.storage_buffer_mask, |binding, element, slot| {
        write(
            binding,
            element,
            vk::DescriptorType::STORAGE_BUFFER,
            DescriptorInfo::Buffer(bindings[slot].buffer),
        );
    });

    for_each_descriptor(layout, layout.sampled_texel_buffer_mask, |binding, element, slot| {
        write(
            binding,
            element,
            vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
            DescriptorInfo::TexelBuffer(bindings[slot].buffer_view),
        );
    });

    for_each_descriptor(layout, layout.sampled_image_mask, |binding, element, slot| {
        let mut info = image_info(layout, binding, &bindings[slot]);
        if layout.has_immutable_sampler(binding) {
            info.sampler = vk::Sampler::null();
        }

        write(
            binding,
            element,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            DescriptorInfo::Image(info),
        );
    });

    for_each_descriptor(layout, layout.separate_image_mask, |binding, element, slot| {
        let mut info = image_info(layout, binding, &bindings[slot]);
        info.sampler = vk::Sampler::null();

        write(
            binding,
            element,
            vk::DescriptorType::SAMPLED_IMAGE,
            DescriptorInfo::Image(info),
        );
    });

    for_each_descriptor(
        layout,
        layout.sampler_mask & !layout.immutable_sampler_mask,
        |binding, element, slot| {
            write(
                binding,
                element,
                vk::DescriptorType::SAMPLER,
                DescriptorInfo::Image(vk::DescriptorImageInfo {
                    sampler: bindings[slot].image_float.sampler,
                    ..Default::default()
                }),
            );
        },
    );

    for_each_descriptor(layout, layout.storage_image_mask, |binding, element, slot| {
        write(
            binding,
            element,
            vk::DescriptorType::STORAGE_IMAGE,
            DescriptorInfo::Image(image_info(layout, binding, &bindings[slot])),
        );
    });

    for_each_descriptor(layout, layout.input_attachment_mask, |binding, element, slot| {
        let mut info = image_info(layout, binding, &bindings[slot]);
        info.sampler = vk::Sampler::null();

        write(
            binding,
            element,
            vk::DescriptorType::INPUT_ATTACHMENT,
            DescriptorInfo::Image(info),
        );
    });

    writes
}
