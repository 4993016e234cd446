//! Allocation and caching of descriptor sets.
//!
//! Descriptor sets used by the recorder are never created one at a time. Each distinct
//! [`DescriptorSetLayout`] gets a [`DescriptorSetAllocator`], shared by every program using that
//! layout. The allocator creates descriptor pools in batches of
//! [`SETS_PER_POOL`](crate::limits::SETS_PER_POOL) sets and caches the sets per recording thread,
//! keyed by the content hash of the resources written into them.
//!
//! A cached set stays valid for [`DESCRIPTOR_RING_SIZE`](crate::limits::DESCRIPTOR_RING_SIZE)
//! frames after its last use. After that it is recycled with new contents, so this number must
//! be larger than the number of frames the device can have in flight.
//!
//! Layouts whose binding 0 is an unsized array are bindless. Their sets are allocated through a
//! [`BindlessDescriptorPool`] instead, and are written directly by index.

pub use self::{
    allocator::{DescriptorSetAllocator, DescriptorSetAllocatorCache},
    bindless::BindlessDescriptorPool,
    layout::DescriptorSetLayout,
};

mod allocator;
mod bindless;
mod layout;
mod ring;
