//! Compile-time limits of the recorder.
//!
//! These bound the fixed-size arrays that make up the recorder state. None of them can be
//! changed at runtime.

/// The number of descriptor sets a program can use.
pub const NUM_DESCRIPTOR_SETS: usize = 8;

/// The number of bindings per descriptor set, array elements included.
pub const NUM_BINDINGS: usize = 32;

/// The number of vertex attributes.
pub const NUM_VERTEX_ATTRIBUTES: usize = 16;

/// The number of vertex buffer bindings.
pub const NUM_VERTEX_BUFFERS: usize = 4;

/// The number of specialization constants that can be set through the recorder.
pub const NUM_SPEC_CONSTANTS: usize = 8;

/// The size in bytes of the push constant block.
pub const PUSH_CONSTANT_SIZE: usize = 128;

/// The number of frames an unused descriptor set survives in the ring cache.
///
/// Must be a power of two and must exceed the number of frames in flight.
pub const DESCRIPTOR_RING_SIZE: usize = 8;

/// The number of descriptor sets allocated from each descriptor pool.
pub const SETS_PER_POOL: u32 = 16;

/// Array size marking a variable-count (bindless) binding.
pub const UNSIZED_ARRAY: u8 = 0xff;

/// The number of bindings that can carry an immutable sampler.
pub const NUM_IMMUTABLE_SAMPLER_BINDINGS: usize = 16;

const _: () = assert!(DESCRIPTOR_RING_SIZE.is_power_of_two());
const _: () = assert!(NUM_BINDINGS <= u32::BITS as usize);
const _: () = assert!(NUM_VERTEX_ATTRIBUTES <= u32::BITS as usize);
const _: () = assert!(NUM_SPEC_CONSTANTS <= u32::BITS as usize);
