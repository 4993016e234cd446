//! The services the recorder needs from a Vulkan device.
//!
//! The recorder and its caches never call Vulkan directly. Object creation, descriptor writes and
//! pipeline compilation are delegated to an implementation of [`Device`], which is free to use
//! any loader, allocator or pipeline cache it wants. All handles crossing this boundary are plain
//! `ash` handles.

use crate::{
    descriptor_set::DescriptorSetLayout,
    limits::NUM_BINDINGS,
    pipeline::{DeferredPipelineCompile, PipelineCompletion},
    resource::{Sampler, StockSampler},
    VulkanError,
};
use ash::vk;
use smallvec::SmallVec;
use std::sync::Arc;

/// Operations a device must provide. Every method may be called from any recording thread.
pub trait Device: Send + Sync {
    /// Returns one of the samplers every device provides.
    fn stock_sampler(&self, sampler: StockSampler) -> &Sampler;

    /// Creates the Vulkan object for a descriptor set layout. Bindings that have an immutable
    /// sampler must bake the corresponding stock sampler, and a bindless layout must be created
    /// with a variable descriptor count and update-after-bind.
    fn create_descriptor_set_layout(
        &self,
        layout: &DescriptorSetLayout,
        stages_for_bindings: &[vk::ShaderStageFlags; NUM_BINDINGS],
    ) -> Result<vk::DescriptorSetLayout, VulkanError>;

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);

    fn create_descriptor_pool(
        &self,
        create_info: &DescriptorPoolCreateInfo,
    ) -> Result<vk::DescriptorPool, VulkanError>;

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);

    /// Allocates one descriptor set per element of `layouts` from `pool`. If
    /// `variable_descriptor_count` is `Some`, it applies to every set.
    fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
        variable_descriptor_count: Option<u32>,
    ) -> Result<SmallVec<[vk::DescriptorSet; 16]>, VulkanError>;

    /// Writes descriptors into `set`. The set is not in use by the device when this is called,
    /// unless it belongs to a bindless pool.
    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]);

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_range: Option<vk::PushConstantRange>,
    ) -> Result<vk::PipelineLayout, VulkanError>;

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);

    /// Compiles a pipeline, blocking until it is ready.
    fn create_pipeline(&self, compile: &DeferredPipelineCompile)
        -> Result<vk::Pipeline, VulkanError>;

    /// Starts compiling a pipeline without blocking. The result must eventually be passed to
    /// [`PipelineCompletion::complete`].
    ///
    /// The default implementation compiles on the calling thread.
    fn create_pipeline_deferred(
        &self,
        compile: DeferredPipelineCompile,
        completion: Arc<PipelineCompletion>,
    ) {
        completion.complete(self.create_pipeline(&compile));
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline);
}

/// Parameters to create a descriptor pool.
#[derive(Clone, Debug, Default)]
pub struct DescriptorPoolCreateInfo {
    /// The maximum number of sets that can be allocated from the pool.
    pub max_sets: u32,

    /// The number of descriptors of each type the pool holds.
    pub pool_sizes: SmallVec<[vk::DescriptorPoolSize; 8]>,

    /// Whether the pool backs update-after-bind sets.
    pub update_after_bind: bool,
}

/// A single descriptor to write into a set.
#[derive(Clone, Copy, Debug)]
pub struct DescriptorWrite {
    pub binding: u32,
    pub array_element: u32,
    pub descriptor_type: vk::DescriptorType,
    pub info: DescriptorInfo,
}

/// The resource written by a [`DescriptorWrite`].
#[derive(Clone, Copy, Debug)]
pub enum DescriptorInfo {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
    TexelBuffer(vk::BufferView),
}
