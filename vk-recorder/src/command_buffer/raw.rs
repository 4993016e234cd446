use crate::{resource::Buffer, VulkanError};
use ash::vk;
use std::sync::Arc;

/// The command buffer the recorder emits resolved commands into.
///
/// Implementations record each call into a Vulkan command buffer as is. The recorder guarantees
/// that every pipeline, descriptor set and piece of dynamic state a draw or dispatch needs has
/// been emitted before the draw or dispatch itself.
pub trait RawCommandBuffer {
    fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    );

    fn next_subpass(&mut self);

    fn end_render_pass(&mut self);

    fn bind_pipeline(&mut self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline);

    fn bind_descriptor_set(
        &mut self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        set: u32,
        descriptor_set: vk::DescriptorSet,
        dynamic_offsets: &[u32],
    );

    fn push_constants(
        &mut self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    );

    fn set_viewport(&mut self, viewport: vk::Viewport);

    fn set_scissor(&mut self, scissor: vk::Rect2D);

    fn set_depth_bias(&mut self, constant_factor: f32, slope_factor: f32);

    fn set_stencil_compare_mask(&mut self, faces: vk::StencilFaceFlags, mask: u32);

    fn set_stencil_write_mask(&mut self, faces: vk::StencilFaceFlags, mask: u32);

    fn set_stencil_reference(&mut self, faces: vk::StencilFaceFlags, reference: u32);

    fn bind_vertex_buffers(
        &mut self,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    );

    fn bind_index_buffer(
        &mut self,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    );

    fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );

    fn draw_indirect(
        &mut self,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        draw_count: u32,
        stride: u32,
    );

    fn draw_indexed_indirect(
        &mut self,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        draw_count: u32,
        stride: u32,
    );

    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32);

    fn dispatch_indirect(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize);
}

/// What transient data is going to be used as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScratchUsage {
    Uniform,
    Vertex,
    Index,
}

/// Where transient data was written.
#[derive(Clone, Debug)]
pub struct ScratchAllocation {
    pub buffer: Arc<Buffer>,
    pub offset: vk::DeviceSize,
    pub size: vk::DeviceSize,
}

/// Provides transient buffer memory that lives until the command buffer has executed.
pub trait ScratchAllocator: Send {
    /// Copies `data` into transient memory suitable for `usage`.
    fn allocate(&mut self, usage: ScratchUsage, data: &[u8])
        -> Result<ScratchAllocation, VulkanError>;
}
