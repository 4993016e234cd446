use super::allocator::DescriptorSetAllocator;
use crate::{
    device::{DescriptorInfo, DescriptorWrite},
    resource::ImageView,
    VulkanError,
};
use ash::vk;
use std::sync::Arc;

/// A fixed-capacity pool of variable-count descriptor sets, written directly by index.
///
/// Each call to [`allocate_descriptors`] allocates a new set from the pool, which then becomes
/// the current set written by the `set_texture*` methods. Nothing written here is tracked or
/// hashed, and sets are never recycled. The caller is responsible for not overwriting a
/// descriptor the device may still read.
///
/// [`allocate_descriptors`]: Self::allocate_descriptors
#[derive(Debug)]
pub struct BindlessDescriptorPool {
    allocator: Arc<DescriptorSetAllocator>,
    pool: vk::DescriptorPool,
    descriptor_type: vk::DescriptorType,
    total_sets: u32,
    total_descriptors: u32,
    allocated_sets: u32,
    allocated_descriptors: u32,
    set: vk::DescriptorSet,
    set_descriptors: u32,
}

impl BindlessDescriptorPool {
    /// Creates a pool that can hold `num_sets` sets and `num_descriptors` descriptors in total.
    ///
    /// # Panics
    ///
    /// - Panics if the layout of `allocator` is not bindless.
    pub fn new(
        allocator: Arc<DescriptorSetAllocator>,
        num_sets: u32,
        num_descriptors: u32,
    ) -> Result<Self, VulkanError> {
        let pool = allocator.allocate_bindless_pool(num_sets, num_descriptors)?;
        let descriptor_type = allocator
            .layout()
            .descriptor_type(0)
            .unwrap_or(vk::DescriptorType::SAMPLED_IMAGE);

        Ok(BindlessDescriptorPool {
            allocator,
            pool,
            descriptor_type,
            total_sets: num_sets,
            total_descriptors: num_descriptors,
            allocated_sets: 0,
            allocated_descriptors: 0,
            set: vk::DescriptorSet::null(),
            set_descriptors: 0,
        })
    }

    /// Allocates a new set of `count` descriptors, which becomes the current set.
    ///
    /// Returns `false` without allocating anything if the pool doesn't have room for another set
    /// or for `count` more descriptors. The current set is left unchanged in that case.
    pub fn allocate_descriptors(&mut self, count: u32) -> Result<bool, VulkanError> {
        let exhausted = self.allocated_sets == self.total_sets
            || self
                .allocated_descriptors
                .checked_add(count)
                .map_or(true, |total| total > self.total_descriptors);

        if exhausted {
            tracing::warn!(
                requested = count,
                allocated = self.allocated_descriptors,
                capacity = self.total_descriptors,
                "bindless descriptor pool is exhausted",
            );

            return Ok(false);
        }

        let set = match self.allocator.allocate_bindless_set(self.pool, count) {
            Ok(set) => set,
            Err(VulkanError::OutOfPoolMemory | VulkanError::FragmentedPool) => return Ok(false),
            Err(err) => return Err(err),
        };

        self.allocated_sets += 1;
        self.allocated_descriptors += count;
        self.set = set;
        self.set_descriptors = count;

        Ok(true)
    }

    /// Returns the current set, which is a null handle until the first successful allocation.
    #[inline]
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.set
    }

    /// Returns the number of descriptors of the current set.
    #[inline]
    pub fn descriptor_count(&self) -> u32 {
        self.set_descriptors
    }

    /// Returns the number of descriptors allocated from the pool so far.
    #[inline]
    pub fn allocated_descriptors(&self) -> u32 {
        self.allocated_descriptors
    }

    /// Writes the float view of `view` at `index` of the current set.
    ///
    /// # Panics
    ///
    /// - Panics if `index` is out of range of the current set.
    pub fn set_texture(&mut self, index: u32, view: &ImageView) {
        self.write_image(index, view.float_view(), view.read_only_layout());
    }

    /// Writes the UNORM view of `view` at `index` of the current set.
    ///
    /// # Panics
    ///
    /// - Panics if `index` is out of range of the current set.
    pub fn set_texture_unorm(&mut self, index: u32, view: &ImageView) {
        self.write_image(index, view.unorm_view(), view.read_only_layout());
    }

    /// Writes the sRGB view of `view` at `index` of the current set.
    ///
    /// # Panics
    ///
    /// - Panics if `index` is out of range of the current set.
    pub fn set_texture_srgb(&mut self, index: u32, view: &ImageView) {
        self.write_image(index, view.srgb_view(), view.read_only_layout());
    }

    fn write_image(&mut self, index: u32, image_view: vk::ImageView, image_layout: vk::ImageLayout) {
        assert!(
            index < self.set_descriptors,
            "index {} is out of range of the current bindless set of {} descriptors",
            index,
            self.set_descriptors,
        );

        self.allocator.device().update_descriptor_set(
            self.set,
            &[DescriptorWrite {
                binding: 0,
                array_element: index,
                descriptor_type: self.descriptor_type,
                info: DescriptorInfo::Image(vk::DescriptorImageInfo {
                    sampler: vk::Sampler::null(),
                    image_view,
                    image_layout,
                }),
            }],
        );
    }
}

impl Drop for BindlessDescriptorPool {
    fn drop(&mut self) {
        self.allocator.device().destroy_descriptor_pool(self.pool);
    }
}

#[cfg(test)]
mod tests {
    use super::BindlessDescriptorPool;
    use crate::{
        descriptor_set::{DescriptorSetAllocator, DescriptorSetLayout},
        device::DescriptorInfo,
        limits::{NUM_BINDINGS, UNSIZED_ARRAY},
        resource::{ImageView, ImageViewCreateInfo},
        tests::MockDevice,
    };
    use ash::vk::{self, Handle};
    use std::sync::Arc;

    fn bindless_allocator(device: Arc<MockDevice>) -> Arc<DescriptorSetAllocator> {
        let mut layout = DescriptorSetLayout {
            separate_image_mask: 1,
            fp_mask: 1,
            ..Default::default()
        };
        layout.array_size[0] = UNSIZED_ARRAY;

        Arc::new(
            DescriptorSetAllocator::new(
                device,
                layout,
                &[vk::ShaderStageFlags::FRAGMENT; NUM_BINDINGS],
                1,
            )
            .unwrap(),
        )
    }

    #[test]
    fn capacity_is_fixed() {
        let device = MockDevice::new();
        let mut pool = BindlessDescriptorPool::new(bindless_allocator(device.clone()), 4, 100)
            .unwrap();

        assert!(pool.allocate_descriptors(60).unwrap());
        let first = pool.descriptor_set();

        // Would exceed the capacity, nothing is allocated.
        assert!(!pool.allocate_descriptors(41).unwrap());
        assert_eq!(pool.descriptor_set(), first);
        assert_eq!(pool.allocated_descriptors(), 60);

        assert!(pool.allocate_descriptors(40).unwrap());
        assert_ne!(pool.descriptor_set(), first);
        assert!(!pool.allocate_descriptors(1).unwrap());
        assert_eq!(device.stats().descriptor_sets_allocated, 2);
    }

    #[test]
    fn set_count_is_fixed() {
        let device = MockDevice::new();
        let mut pool = BindlessDescriptorPool::new(bindless_allocator(device), 2, 100).unwrap();

        assert!(pool.allocate_descriptors(1).unwrap());
        assert!(pool.allocate_descriptors(1).unwrap());
        assert!(!pool.allocate_descriptors(1).unwrap());
    }

    #[test]
    fn writes_views_by_index() {
        let device = MockDevice::new();
        let mut pool =
            BindlessDescriptorPool::new(bindless_allocator(device.clone()), 1, 16).unwrap();
        assert!(pool.allocate_descriptors(16).unwrap());

        let view = ImageView::new(ImageViewCreateInfo {
            float_view: vk::ImageView::from_raw(10),
            unorm_view: Some(vk::ImageView::from_raw(11)),
            srgb_view: Some(vk::ImageView::from_raw(12)),
            ..Default::default()
        });
        pool.set_texture(0, &view);
        pool.set_texture_unorm(1, &view);
        pool.set_texture_srgb(15, &view);

        let writes = device.descriptor_writes();
        assert_eq!(writes.len(), 3);

        let views: Vec<_> = writes
            .iter()
            .map(|(set, write)| {
                assert_eq!(*set, pool.descriptor_set());
                assert_eq!(write.descriptor_type, vk::DescriptorType::SAMPLED_IMAGE);

                match write.info {
                    DescriptorInfo::Image(info) => (write.array_element, info.image_view.as_raw()),
                    _ => panic!("expected an image write"),
                }
            })
            .collect();
        assert_eq!(views, [(0, 10), (1, 11), (15, 12)]);

        assert_should_panic!("out of range", { pool.set_texture(16, &view) });
    }

    #[test]
    fn drop_destroys_pool() {
        let device = MockDevice::new();
        let pool = BindlessDescriptorPool::new(bindless_allocator(device.clone()), 1, 1).unwrap();
        drop(pool);

        assert_eq!(device.stats().descriptor_pools_destroyed, 1);
    }

    #[test]
    fn regular_layout_is_rejected() {
        let device = MockDevice::new();
        let allocator = Arc::new(
            DescriptorSetAllocator::new(
                device,
                DescriptorSetLayout {
                    uniform_buffer_mask: 1,
                    ..Default::default()
                },
                &[vk::ShaderStageFlags::VERTEX; NUM_BINDINGS],
                1,
            )
            .unwrap(),
        );

        assert_should_panic!("not bindless", {
            let _ = BindlessDescriptorPool::new(allocator, 1, 1);
        });
    }
}
