use crate::{
    descriptor_set::{DescriptorSetAllocator, DescriptorSetAllocatorCache, DescriptorSetLayout},
    device::Device,
    hash::{Hash, Hasher},
    limits::{NUM_BINDINGS, NUM_DESCRIPTOR_SETS, PUSH_CONSTANT_SIZE},
    shader::ShaderStage,
    VulkanError,
};
use ash::vk;
use smallvec::SmallVec;
use std::{fmt, sync::Arc};

/// The resources used by all stages of a program, as reflected from its shaders.
#[derive(Clone, Debug, Default)]
pub struct CombinedResourceLayout {
    /// The vertex attributes read by the vertex shader.
    pub attribute_mask: u32,

    /// The color attachments written by the fragment shader.
    pub render_target_mask: u32,

    pub sets: [DescriptorSetLayout; NUM_DESCRIPTOR_SETS],

    /// The stages using each binding of each set.
    pub stages_for_bindings: [[vk::ShaderStageFlags; NUM_BINDINGS]; NUM_DESCRIPTOR_SETS],

    /// The stages using each set.
    pub stages_for_sets: [vk::ShaderStageFlags; NUM_DESCRIPTOR_SETS],

    /// The sets used by the program.
    pub descriptor_set_mask: u32,

    /// The push constant range, which is unused if its size is zero.
    pub push_constant_range: vk::PushConstantRange,

    /// The specialization constants declared by each stage.
    pub spec_constant_mask: [u32; ShaderStage::COUNT],

    /// The union of `spec_constant_mask`.
    pub combined_spec_constant_mask: u32,
}

/// A pipeline layout, along with the descriptor set allocator of each of its sets.
pub struct PipelineLayout {
    device: Arc<dyn Device>,
    handle: vk::PipelineLayout,
    resource_layout: CombinedResourceLayout,
    allocators: [Option<Arc<DescriptorSetAllocator>>; NUM_DESCRIPTOR_SETS],
    hash: Hash,
    push_constant_layout_hash: Hash,
}

impl PipelineLayout {
    /// Creates a pipeline layout, sharing the allocators of layouts already known to
    /// `allocators`.
    ///
    /// Sets below the highest used set that the program doesn't use get an empty layout.
    ///
    /// # Panics
    ///
    /// - Panics if the push constant range is larger than [`PUSH_CONSTANT_SIZE`].
    pub fn new(
        allocators: &DescriptorSetAllocatorCache,
        resource_layout: CombinedResourceLayout,
    ) -> Result<Arc<Self>, VulkanError> {
        let range = resource_layout.push_constant_range;
        assert!(
            range.offset as usize + range.size as usize <= PUSH_CONSTANT_SIZE,
            "the push constant range exceeds {} bytes",
            PUSH_CONSTANT_SIZE,
        );

        let num_sets = (u32::BITS - resource_layout.descriptor_set_mask.leading_zeros()) as usize;
        let mut set_allocators: [Option<Arc<DescriptorSetAllocator>>; NUM_DESCRIPTOR_SETS] =
            Default::default();
        let mut set_layouts: SmallVec<[vk::DescriptorSetLayout; NUM_DESCRIPTOR_SETS]> =
            SmallVec::new();
        let mut h = Hasher::new();

        for set in 0..num_sets {
            let allocator = if resource_layout.descriptor_set_mask & (1 << set) != 0 {
                allocators.get_or_create(
                    &resource_layout.sets[set],
                    &resource_layout.stages_for_bindings[set],
                )?
            } else {
                allocators.get_or_create(
                    &DescriptorSetLayout::default(),
                    &[vk::ShaderStageFlags::empty(); NUM_BINDINGS],
                )?
            };

            h.u64(allocator.hash());
            set_layouts.push(allocator.handle());
            set_allocators[set] = Some(allocator);
        }

        let push_constant_layout_hash = {
            let mut h = Hasher::new();
            h.u32(range.stage_flags.as_raw());
            h.u32(range.offset);
            h.u32(range.size);
            h.get()
        };
        h.u64(push_constant_layout_hash);

        let device = allocators.device().clone();
        let handle = device.create_pipeline_layout(
            &set_layouts,
            (range.size != 0).then_some(range),
        )?;

        Ok(Arc::new(PipelineLayout {
            device,
            handle,
            resource_layout,
            allocators: set_allocators,
            hash: h.get(),
            push_constant_layout_hash,
        }))
    }

    /// Returns the Vulkan pipeline layout.
    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.handle
    }

    #[inline]
    pub fn resource_layout(&self) -> &CombinedResourceLayout {
        &self.resource_layout
    }

    /// Returns the allocator of `set`, if the layout has that set.
    #[inline]
    pub fn allocator(&self, set: u32) -> Option<&Arc<DescriptorSetAllocator>> {
        self.allocators.get(set as usize)?.as_ref()
    }

    /// Returns the allocator of a set that the layout has.
    pub(crate) fn set_allocator(&self, set: u32) -> &Arc<DescriptorSetAllocator> {
        match self.allocator(set) {
            Some(allocator) => allocator,
            None => panic!("set {} is not part of the pipeline layout", set),
        }
    }

    /// Returns the hash of the set layouts and the push constant range.
    #[inline]
    pub fn hash(&self) -> Hash {
        self.hash
    }

    #[inline]
    pub fn push_constant_layout_hash(&self) -> Hash {
        self.push_constant_layout_hash
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        self.device.destroy_pipeline_layout(self.handle);
    }
}

impl fmt::Debug for PipelineLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineLayout")
            .field("handle", &self.handle)
            .field("resource_layout", &self.resource_layout)
            .field("hash", &self.hash)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::{CombinedResourceLayout, PipelineLayout};
    use crate::{
        descriptor_set::{DescriptorSetAllocatorCache, DescriptorSetLayout},
        tests::MockDevice,
    };
    use ash::vk;
    use std::sync::Arc;

    fn resource_layout() -> CombinedResourceLayout {
        let mut layout = CombinedResourceLayout {
            descriptor_set_mask: 0b101,
            ..Default::default()
        };
        layout.sets[0] = DescriptorSetLayout {
            uniform_buffer_mask: 1,
            ..Default::default()
        };
        layout.sets[2] = DescriptorSetLayout {
            sampled_image_mask: 1,
            fp_mask: 1,
            ..Default::default()
        };
        layout
    }

    #[test]
    fn gaps_get_empty_sets() {
        let device = MockDevice::new();
        let cache = DescriptorSetAllocatorCache::new(device.clone(), 1);
        let layout = PipelineLayout::new(&cache, resource_layout()).unwrap();

        assert!(layout.allocator(0).is_some());
        assert!(layout.allocator(1).unwrap().layout().binding_mask() == 0);
        assert!(layout.allocator(2).is_some());
        assert!(layout.allocator(3).is_none());
        assert_eq!(cache.len(), 3);
        assert_eq!(device.last_pipeline_layout_sets(), 3);
    }

    #[test]
    fn same_layout_same_hash() {
        let device = MockDevice::new();
        let cache = DescriptorSetAllocatorCache::new(device, 1);
        let a = PipelineLayout::new(&cache, resource_layout()).unwrap();
        let b = PipelineLayout::new(&cache, resource_layout()).unwrap();

        assert_eq!(a.hash(), b.hash());
        assert!(Arc::ptr_eq(
            a.allocator(2).unwrap(),
            b.allocator(2).unwrap(),
        ));

        let mut other = resource_layout();
        other.push_constant_range = vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX,
            offset: 0,
            size: 16,
        };
        let c = PipelineLayout::new(&cache, other).unwrap();
        assert_ne!(a.hash(), c.hash());
        assert_ne!(a.push_constant_layout_hash(), c.push_constant_layout_hash());
    }

    #[test]
    fn oversized_push_constants() {
        let device = MockDevice::new();
        let cache = DescriptorSetAllocatorCache::new(device, 1);
        let mut layout = resource_layout();
        layout.push_constant_range.size = 256;

        assert_should_panic!("push constant range", {
            let _ = PipelineLayout::new(&cache, layout);
        });
    }
}
