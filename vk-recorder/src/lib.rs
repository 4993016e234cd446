// Copyright (c) 2024 The vk-recorder developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! State-tracking Vulkan command recording.
//!
//! # Overview
//!
//! - A [`RecordingCommandBuffer`](crate::command_buffer::RecordingCommandBuffer) accumulates
//!   fixed-function state, a bound [`Program`](crate::shader::Program), resource bindings,
//!   vertex input and push constants. Setters only mark state dirty when the value actually
//!   changes. Nothing reaches the device until a draw or a dispatch.
//!
//! - On a draw or dispatch the recorder resolves dirty state in a fixed order: first the
//!   pipeline, through the process-wide [`PipelineCache`](crate::pipeline::PipelineCache), then
//!   every dirty descriptor set, through the
//!   [`DescriptorSetAllocator`](crate::descriptor_set::DescriptorSetAllocator) of its layout,
//!   then push constants and dynamic state. Only then is the draw emitted to the underlying
//!   [`RawCommandBuffer`](crate::command_buffer::RawCommandBuffer).
//!
//! - Descriptor sets are cached per recording thread in a ring indexed by frame. Entries that
//!   have not been used for [`DESCRIPTOR_RING_SIZE`](crate::limits::DESCRIPTOR_RING_SIZE) frames
//!   are recycled with new contents.
//!
//! - Large index-addressed tables live in a
//!   [`BindlessDescriptorPool`](crate::descriptor_set::BindlessDescriptorPool), which has a fixed
//!   capacity and is never recycled.
//!
//! Every interaction with the driver goes through the [`Device`](crate::device::Device) trait
//! and the `RawCommandBuffer` trait. The crate does not load Vulkan itself.

pub use ash::vk::Handle;
use ash::vk;


mod bits;
mod cache;
pub mod command_buffer;
pub mod descriptor_set;
pub mod device;
pub mod hash;
pub mod limits;
mod macros;
pub mod pipeline;
pub mod render_pass;
pub mod resource;
pub mod shader;

/// Error returned by the device when one of its operations fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum VulkanError {
    #[error("a host memory allocation has failed")]
    OutOfHostMemory,

    #[error("a device memory allocation has failed")]
    OutOfDeviceMemory,

    #[error("a pool memory allocation has failed")]
    OutOfPoolMemory,

    #[error("a pool allocation has failed due to fragmentation of the pool's memory")]
    FragmentedPool,

    #[error("the logical or physical device has been lost")]
    DeviceLost,

    #[error("the device returned an unexpected result: {0:?}")]
    Unnamed(vk::Result),
}

impl From<vk::Result> for VulkanError {
    fn from(val: vk::Result) -> VulkanError {
        match val {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY => Self::OutOfHostMemory,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => Self::OutOfDeviceMemory,
            vk::Result::ERROR_OUT_OF_POOL_MEMORY => Self::OutOfPoolMemory,
            vk::Result::ERROR_FRAGMENTED_POOL => Self::FragmentedPool,
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            _ => Self::Unnamed(val),
        }
    }
}
