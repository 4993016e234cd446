use super::{layout::DescriptorSetLayout, ring::RingCache};
use crate::{
    cache::OnceCache,
    device::{DescriptorPoolCreateInfo, Device},
    hash::Hash,
    limits::{NUM_BINDINGS, SETS_PER_POOL},
    VulkanError,
};
use ash::vk;
use crossbeam_queue::SegQueue;
use parking_lot::Mutex;
use smallvec::{smallvec, SmallVec};
use std::{fmt, sync::Arc};

/// Allocates and caches the descriptor sets of a single layout.
///
/// Sets are cached per recording thread index, keyed by the content hash of the descriptors
/// written into them. A thread only ever touches its own cache, so recording threads never wait
/// on each other as long as each thread index is used by one thread at a time. When a thread
/// runs out of vacant sets, a new pool of [`SETS_PER_POOL`] sets is created and its sets are
/// handed to that thread. Pools are only destroyed all at once, by [`clear`].
///
/// [`clear`]: Self::clear
pub struct DescriptorSetAllocator {
    device: Arc<dyn Device>,
    layout: DescriptorSetLayout,
    handle: vk::DescriptorSetLayout,
    hash: Hash,
    pool_sizes: SmallVec<[vk::DescriptorPoolSize; 8]>,
    per_thread: Vec<Mutex<PerThread>>,
    pools: SegQueue<vk::DescriptorPool>,
}

struct PerThread {
    sets: RingCache<vk::DescriptorSet>,
    should_begin: bool,
}

impl DescriptorSetAllocator {
    /// Creates an allocator for `layout`, with a separate cache for each of the
    /// `num_thread_indices` recording threads.
    ///
    /// # Panics
    ///
    /// - Panics if `layout` is not well formed, see [`DescriptorSetLayout::validate`].
    /// - Panics if `num_thread_indices` is zero.
    pub fn new(
        device: Arc<dyn Device>,
        layout: DescriptorSetLayout,
        stages_for_bindings: &[vk::ShaderStageFlags; NUM_BINDINGS],
        num_thread_indices: usize,
    ) -> Result<Self, VulkanError> {
        layout.validate();
        assert!(
            num_thread_indices > 0,
            "an allocator needs at least one thread index",
        );

        let handle = device.create_descriptor_set_layout(&layout, stages_for_bindings)?;

        // Bindless sets come from their own pools and are never cached.
        let per_thread = if layout.is_bindless() {
            Vec::new()
        } else {
            (0..num_thread_indices)
                .map(|_| {
                    Mutex::new(PerThread {
                        sets: RingCache::new(),
                        should_begin: true,
                    })
                })
                .collect()
        };

        Ok(DescriptorSetAllocator {
            hash: layout.hash(stages_for_bindings),
            pool_sizes: layout.pool_sizes(),
            device,
            layout,
            handle,
            per_thread,
            pools: SegQueue::new(),
        })
    }

    #[inline]
    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    #[inline]
    pub fn layout(&self) -> &DescriptorSetLayout {
        &self.layout
    }

    /// Returns the Vulkan descriptor set layout.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }

    /// Returns the hash identifying this allocator, which covers the layout and the stages of
    /// every binding.
    #[inline]
    pub fn hash(&self) -> Hash {
        self.hash
    }

    #[inline]
    pub fn is_bindless(&self) -> bool {
        self.layout.is_bindless()
    }

    /// Marks the start of a new frame.
    ///
    /// Every thread advances its ring on its next call to [`find`], which evicts the sets that
    /// have not been used for [`DESCRIPTOR_RING_SIZE`] frames.
    ///
    /// [`find`]: Self::find
    /// [`DESCRIPTOR_RING_SIZE`]: crate::limits::DESCRIPTOR_RING_SIZE
    pub fn begin_frame(&self) {
        for state in &self.per_thread {
            state.lock().should_begin = true;
        }
    }

    /// Returns the descriptor set cached under `hash` for `thread_index`, and whether it was
    /// already cached.
    ///
    /// When it was not, the returned set holds stale descriptors and the caller must write every
    /// descriptor of the layout before binding it.
    ///
    /// # Panics
    ///
    /// - Panics if the layout is bindless.
    /// - Panics if `thread_index` is out of range.
    pub fn find(
        &self,
        thread_index: usize,
        hash: Hash,
    ) -> Result<(vk::DescriptorSet, bool), VulkanError> {
        assert!(
            !self.is_bindless(),
            "sets of a bindless layout must be allocated from a bindless pool",
        );
        assert!(
            thread_index < self.per_thread.len(),
            "thread index {} is out of range, the allocator has {} thread indices",
            thread_index,
            self.per_thread.len(),
        );

        let mut state = self.per_thread[thread_index].lock();

        if state.should_begin {
            state.sets.begin_frame();
            state.should_begin = false;
        }

        if let Some(set) = state.sets.request(hash) {
            return Ok((set, true));
        }

        if let Some(set) = state.sets.request_vacant(hash) {
            return Ok((set, false));
        }

        for set in self.allocate_pool()? {
            state.sets.make_vacant(set);
        }

        state
            .sets
            .request_vacant(hash)
            .map(|set| (set, false))
            .ok_or(VulkanError::OutOfPoolMemory)
    }

    fn allocate_pool(&self) -> Result<SmallVec<[vk::DescriptorSet; 16]>, VulkanError> {
        let pool = self.device.create_descriptor_pool(&DescriptorPoolCreateInfo {
            max_sets: SETS_PER_POOL,
            pool_sizes: self.pool_sizes.clone(),
            update_after_bind: false,
        })?;

        let layouts: SmallVec<[_; 16]> = smallvec![self.handle; SETS_PER_POOL as usize];

        let sets = match self.device.allocate_descriptor_sets(pool, &layouts, None) {
            Ok(sets) => sets,
            Err(err) => {
                self.device.destroy_descriptor_pool(pool);
                return Err(err);
            }
        };

        self.pools.push(pool);

        tracing::trace!(
            layout = format_args!("{:016x}", self.hash),
            pools = self.pools.len(),
            "allocated descriptor pool",
        );

        Ok(sets)
    }

    /// Returns the number of descriptor pools created so far.
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Destroys every pool and forgets every cached set.
    ///
    /// The device must not be using any set allocated from this allocator, and no other thread
    /// may be recording with it.
    pub fn clear(&self) {
        for state in &self.per_thread {
            let mut state = state.lock();
            state.sets.clear();
            state.should_begin = true;
        }

        while let Some(pool) = self.pools.pop() {
            self.device.destroy_descriptor_pool(pool);
        }
    }

    /// Creates a pool for sets of this bindless layout, with room for `num_sets` sets and
    /// `num_descriptors` descriptors in total.
    ///
    /// # Panics
    ///
    /// - Panics if the layout is not bindless.
    pub fn allocate_bindless_pool(
        &self,
        num_sets: u32,
        num_descriptors: u32,
    ) -> Result<vk::DescriptorPool, VulkanError> {
        assert!(self.is_bindless(), "the layout is not bindless");

        let ty = self
            .layout
            .descriptor_type(0)
            .unwrap_or(vk::DescriptorType::SAMPLED_IMAGE);

        self.device.create_descriptor_pool(&DescriptorPoolCreateInfo {
            max_sets: num_sets,
            pool_sizes: smallvec![vk::DescriptorPoolSize {
                ty,
                descriptor_count: num_descriptors,
            }],
            update_after_bind: true,
        })
    }

    /// Allocates a set with `num_descriptors` descriptors from a pool returned by
    /// [`allocate_bindless_pool`].
    ///
    /// [`allocate_bindless_pool`]: Self::allocate_bindless_pool
    ///
    /// # Panics
    ///
    /// - Panics if the layout is not bindless.
    pub fn allocate_bindless_set(
        &self,
        pool: vk::DescriptorPool,
        num_descriptors: u32,
    ) -> Result<vk::DescriptorSet, VulkanError> {
        assert!(self.is_bindless(), "the layout is not bindless");

        self.device
            .allocate_descriptor_sets(pool, &[self.handle], Some(num_descriptors))?
            .into_iter()
            .next()
            .ok_or(VulkanError::OutOfPoolMemory)
    }
}

impl Drop for DescriptorSetAllocator {
    fn drop(&mut self) {
        self.clear();
        self.device.destroy_descriptor_set_layout(self.handle);
    }
}

impl fmt::Debug for DescriptorSetAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorSetAllocator")
            .field("layout", &self.layout)
            .field("handle", &self.handle)
            .field("hash", &self.hash)
            .field("pools", &self.pools.len())
            .finish_non_exhaustive()
    }
}

/// Shares one [`DescriptorSetAllocator`] between every program using the same layout.
pub struct DescriptorSetAllocatorCache {
    device: Arc<dyn Device>,
    num_thread_indices: usize,
    allocators: OnceCache<Hash, Arc<DescriptorSetAllocator>>,
}

impl DescriptorSetAllocatorCache {
    /// # Panics
    ///
    /// - Panics if `num_thread_indices` is zero.
    pub fn new(device: Arc<dyn Device>, num_thread_indices: usize) -> Self {
        assert!(
            num_thread_indices > 0,
            "an allocator needs at least one thread index",
        );

        DescriptorSetAllocatorCache {
            device,
            num_thread_indices,
            allocators: OnceCache::new(),
        }
    }

    #[inline]
    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    #[inline]
    pub fn num_thread_indices(&self) -> usize {
        self.num_thread_indices
    }

    /// Returns the allocator for `layout`, creating it if this is the first time the layout is
    /// seen with these stages.
    pub fn get_or_create(
        &self,
        layout: &DescriptorSetLayout,
        stages_for_bindings: &[vk::ShaderStageFlags; NUM_BINDINGS],
    ) -> Result<Arc<DescriptorSetAllocator>, VulkanError> {
        self.allocators
            .get_or_try_insert(layout.hash(stages_for_bindings), || {
                DescriptorSetAllocator::new(
                    self.device.clone(),
                    *layout,
                    stages_for_bindings,
                    self.num_thread_indices,
                )
                .map(Arc::new)
            })
    }

    /// Calls [`DescriptorSetAllocator::begin_frame`] on every allocator.
    pub fn begin_frame(&self) {
        for allocator in self.allocators.values() {
            allocator.begin_frame();
        }
    }

    /// Calls [`DescriptorSetAllocator::clear`] on every allocator.
    pub fn clear(&self) {
        for allocator in self.allocators.values() {
            allocator.clear();
        }
    }

    /// Returns the number of distinct layouts seen so far.
    pub fn len(&self) -> usize {
        self.allocators.len()
    }
}

impl fmt::Debug for DescriptorSetAllocatorCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorSetAllocatorCache")
            .field("num_thread_indices", &self.num_thread_indices)
            .field("allocators", &self.allocators.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::{DescriptorSetAllocator, DescriptorSetAllocatorCache};
    use crate::{
        descriptor_set::DescriptorSetLayout,
        limits::{DESCRIPTOR_RING_SIZE, NUM_BINDINGS, SETS_PER_POOL},
        tests::MockDevice,
    };
    use ash::vk;
    use std::sync::Arc;

    fn ubo_layout() -> DescriptorSetLayout {
        DescriptorSetLayout {
            uniform_buffer_mask: 1,
            ..Default::default()
        }
    }

    fn stages() -> [vk::ShaderStageFlags; NUM_BINDINGS] {
        [vk::ShaderStageFlags::VERTEX; NUM_BINDINGS]
    }

    #[test]
    fn find_caches_by_hash() {
        let device = MockDevice::new();
        let allocator = DescriptorSetAllocator::new(device.clone(), ubo_layout(), &stages(), 1)
            .unwrap();

        let (a, present) = allocator.find(0, 1).unwrap();
        assert!(!present);
        let (b, present) = allocator.find(0, 1).unwrap();
        assert!(present);
        assert_eq!(a, b);

        let (c, present) = allocator.find(0, 2).unwrap();
        assert!(!present);
        assert_ne!(a, c);
        assert_eq!(device.stats().descriptor_pools_created, 1);
    }

    #[test]
    fn evicted_after_ring_size_frames() {
        let device = MockDevice::new();
        let allocator = DescriptorSetAllocator::new(device, ubo_layout(), &stages(), 1).unwrap();

        for hash in 0..=DESCRIPTOR_RING_SIZE as u64 {
            allocator.begin_frame();
            let (_, present) = allocator.find(0, hash).unwrap();
            assert!(!present);
        }

        let (_, present) = allocator.find(0, 0).unwrap();
        assert!(!present);

        let (_, present) = allocator.find(0, DESCRIPTOR_RING_SIZE as u64).unwrap();
        assert!(present);
    }

    #[test]
    fn evicted_sets_are_reused() {
        let device = MockDevice::new();
        let allocator =
            DescriptorSetAllocator::new(device.clone(), ubo_layout(), &stages(), 1).unwrap();

        // Every frame uses a full pool worth of new sets, which stays within the capacity of the
        // pools created during the first ring of frames.
        for frame in 0..4 * DESCRIPTOR_RING_SIZE as u64 {
            allocator.begin_frame();

            for i in 0..u64::from(SETS_PER_POOL) {
                allocator.find(0, frame * 1000 + i).unwrap();
            }
        }

        assert_eq!(allocator.pool_count(), DESCRIPTOR_RING_SIZE);
        assert_eq!(
            device.stats().descriptor_pools_created,
            DESCRIPTOR_RING_SIZE,
        );
    }

    #[test]
    fn threads_are_isolated() {
        let device = MockDevice::new();
        let allocator = Arc::new(
            DescriptorSetAllocator::new(device.clone(), ubo_layout(), &stages(), 2).unwrap(),
        );

        let (a, _) = allocator.find(0, 7).unwrap();
        let other = allocator.clone();
        let (b, present) = std::thread::spawn(move || other.find(1, 7).unwrap())
            .join()
            .unwrap();

        assert!(!present);
        assert_ne!(a, b);
        assert_eq!(device.stats().descriptor_pools_created, 2);
    }

    #[test]
    fn clear_destroys_pools() {
        let device = MockDevice::new();
        let allocator =
            DescriptorSetAllocator::new(device.clone(), ubo_layout(), &stages(), 1).unwrap();

        allocator.find(0, 1).unwrap();
        allocator.clear();

        assert_eq!(allocator.pool_count(), 0);
        assert_eq!(device.stats().descriptor_pools_destroyed, 1);

        let (_, present) = allocator.find(0, 1).unwrap();
        assert!(!present);

        drop(allocator);
        assert_eq!(device.stats().descriptor_pools_destroyed, 2);
        assert_eq!(device.stats().descriptor_set_layouts_destroyed, 1);
    }

    #[test]
    fn thread_index_out_of_range() {
        let device = MockDevice::new();
        let allocator = DescriptorSetAllocator::new(device, ubo_layout(), &stages(), 1).unwrap();

        assert_should_panic!("out of range", {
            let _ = allocator.find(1, 0);
        });
    }

    #[test]
    fn pool_failure_propagates() {
        let device = MockDevice::new();
        let allocator =
            DescriptorSetAllocator::new(device.clone(), ubo_layout(), &stages(), 1).unwrap();

        device.fail_descriptor_pools(true);
        assert!(allocator.find(0, 1).is_err());

        device.fail_descriptor_pools(false);
        assert!(allocator.find(0, 1).is_ok());
    }

    #[test]
    fn cache_shares_allocators() {
        let device = MockDevice::new();
        let cache = DescriptorSetAllocatorCache::new(device, 1);

        let a = cache.get_or_create(&ubo_layout(), &stages()).unwrap();
        let b = cache.get_or_create(&ubo_layout(), &stages()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let mut other_stages = stages();
        other_stages[0] = vk::ShaderStageFlags::FRAGMENT;
        let c = cache.get_or_create(&ubo_layout(), &other_stages).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn cache_begin_frame_reaches_allocators() {
        let device = MockDevice::new();
        let cache = DescriptorSetAllocatorCache::new(device, 1);
        let allocator = cache.get_or_create(&ubo_layout(), &stages()).unwrap();

        allocator.find(0, 1).unwrap();

        for _ in 0..DESCRIPTOR_RING_SIZE {
            cache.begin_frame();
            allocator.find(0, 2).unwrap();
        }

        let (_, present) = allocator.find(0, 1).unwrap();
        assert!(!present);
    }
}
