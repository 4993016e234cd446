//! Describes the content of a descriptor set as seen by a program.
//!
//! A [`DescriptorSetLayout`] is a set of bitmasks, one per descriptor type, indexed by binding.
//! It is produced by shader reflection and is immutable once a program has been created from it.
//! Its content hash, combined with the shader stages of each binding, identifies the
//! [`DescriptorSetAllocator`] shared by every program using the same layout.
//!
//! [`DescriptorSetAllocator`]: super::DescriptorSetAllocator

use crate::{
    bits::iter_bits,
    hash::{Hash, Hasher},
    limits::{NUM_BINDINGS, NUM_IMMUTABLE_SAMPLER_BINDINGS, SETS_PER_POOL, UNSIZED_ARRAY},
    resource::StockSampler,
};
use ash::vk;
use smallvec::SmallVec;

/// The resources a single descriptor set expects, per binding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DescriptorSetLayout {
    /// Bindings holding a combined image sampler.
    pub sampled_image_mask: u32,

    /// Bindings holding a storage image.
    pub storage_image_mask: u32,

    /// Bindings holding a uniform buffer. These are always bound with a dynamic offset.
    pub uniform_buffer_mask: u32,

    /// Bindings holding a storage buffer.
    pub storage_buffer_mask: u32,

    /// Bindings holding a uniform texel buffer.
    pub sampled_texel_buffer_mask: u32,

    /// Bindings holding an input attachment.
    pub input_attachment_mask: u32,

    /// Bindings holding a sampler alone.
    pub sampler_mask: u32,

    /// Bindings holding an image without a sampler.
    pub separate_image_mask: u32,

    /// Image bindings read with a floating-point (or normalized) type. Other image bindings are
    /// read with an integer type and get the integer view of the image.
    pub fp_mask: u32,

    /// Bindings whose sampler is baked into the layout.
    pub immutable_sampler_mask: u32,

    /// The stock sampler of every immutable sampler binding, four bits per binding.
    pub immutable_samplers: u64,

    /// The array size of each binding. `0` is treated as `1`, [`UNSIZED_ARRAY`] marks a
    /// variable-count binding.
    pub array_size: [u8; NUM_BINDINGS],
}

impl DescriptorSetLayout {
    /// Returns the union of all the type masks.
    #[inline]
    pub fn binding_mask(&self) -> u32 {
        self.sampled_image_mask
            | self.storage_image_mask
            | self.uniform_buffer_mask
            | self.storage_buffer_mask
            | self.sampled_texel_buffer_mask
            | self.input_attachment_mask
            | self.sampler_mask
            | self.separate_image_mask
    }

    /// Returns whether the set is a variable-count table allocated from a bindless pool.
    #[inline]
    pub fn is_bindless(&self) -> bool {
        self.array_size[0] == UNSIZED_ARRAY
    }

    /// Returns the number of descriptors of `binding`, which is `0` for unused bindings and
    /// bindless bindings.
    #[inline]
    pub fn descriptor_count(&self, binding: u32) -> u32 {
        if self.binding_mask() & (1 << binding) == 0 {
            return 0;
        }

        match self.array_size[binding as usize] {
            UNSIZED_ARRAY => 0,
            0 => 1,
            size => u32::from(size),
        }
    }

    /// Returns the descriptor type used for `binding`, if it is used.
    pub fn descriptor_type(&self, binding: u32) -> Option<vk::DescriptorType> {
        let bit = 1 << binding;

        Some(if self.sampled_image_mask & bit != 0 {
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        } else if self.storage_image_mask & bit != 0 {
            vk::DescriptorType::STORAGE_IMAGE
        } else if self.uniform_buffer_mask & bit != 0 {
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
        } else if self.storage_buffer_mask & bit != 0 {
            vk::DescriptorType::STORAGE_BUFFER
        } else if self.sampled_texel_buffer_mask & bit != 0 {
            vk::DescriptorType::UNIFORM_TEXEL_BUFFER
        } else if self.input_attachment_mask & bit != 0 {
            vk::DescriptorType::INPUT_ATTACHMENT
        } else if self.sampler_mask & bit != 0 {
            vk::DescriptorType::SAMPLER
        } else if self.separate_image_mask & bit != 0 {
            vk::DescriptorType::SAMPLED_IMAGE
        } else {
            return None;
        })
    }

    /// Bakes `sampler` into `binding`.
    ///
    /// # Panics
    ///
    /// - Panics if `binding` is not below [`NUM_IMMUTABLE_SAMPLER_BINDINGS`].
    pub fn set_immutable_sampler(&mut self, binding: u32, sampler: StockSampler) {
        assert!(
            (binding as usize) < NUM_IMMUTABLE_SAMPLER_BINDINGS,
            "only the first {} bindings can have an immutable sampler",
            NUM_IMMUTABLE_SAMPLER_BINDINGS,
        );

        let shift = binding * 4;
        self.immutable_samplers &= !(0xf << shift);
        self.immutable_samplers |= u64::from(sampler as u8) << shift;
        self.immutable_sampler_mask |= 1 << binding;
    }

    /// Returns the immutable sampler of `binding`, if there is one.
    pub fn immutable_sampler(&self, binding: u32) -> Option<StockSampler> {
        if self.immutable_sampler_mask & (1 << binding) == 0 {
            return None;
        }

        StockSampler::from_index(((self.immutable_samplers >> (binding * 4)) & 0xf) as u8)
    }

    #[inline]
    pub fn has_immutable_sampler(&self, binding: u32) -> bool {
        self.immutable_sampler_mask & (1 << binding) != 0
    }

    /// Returns the pool sizes needed for a pool of [`SETS_PER_POOL`] sets of this layout.
    pub fn pool_sizes(&self) -> SmallVec<[vk::DescriptorPoolSize; 8]> {
        let mut pool_sizes: SmallVec<[vk::DescriptorPoolSize; 8]> = SmallVec::new();

        for binding in iter_bits(self.binding_mask()) {
            let count = self.descriptor_count(binding) * SETS_PER_POOL;

            // Checked by `binding_mask`.
            let Some(ty) = self.descriptor_type(binding) else {
                continue;
            };

            match pool_sizes.iter_mut().find(|size| size.ty == ty) {
                Some(size) => size.descriptor_count += count,
                None => pool_sizes.push(vk::DescriptorPoolSize {
                    ty,
                    descriptor_count: count,
                }),
            }
        }

        pool_sizes
    }

    /// Checks that the layout is well formed.
    ///
    /// # Panics
    ///
    /// - Panics if a binding has more than one descriptor type.
    /// - Panics if an array runs past the last binding.
    /// - Panics if a binding other than binding 0 is unsized, or if an unsized binding 0 is not
    ///   the only binding.
    pub fn validate(&self) {
        let masks = [
            self.sampled_image_mask,
            self.storage_image_mask,
            self.uniform_buffer_mask,
            self.storage_buffer_mask,
            self.sampled_texel_buffer_mask,
            self.input_attachment_mask,
            self.sampler_mask,
            self.separate_image_mask,
        ];
        let total: u32 = masks.iter().map(|mask| mask.count_ones()).sum();
        assert_eq!(
            total,
            self.binding_mask().count_ones(),
            "a binding of a descriptor set layout has more than one descriptor type",
        );

        for binding in iter_bits(self.binding_mask()) {
            let size = self.array_size[binding as usize];

            if size == UNSIZED_ARRAY {
                assert!(
                    binding == 0 && self.binding_mask() == 1,
                    "only binding 0 can be unsized, and it must be the only binding",
                );
            } else {
                assert!(
                    binding as usize + usize::from(size.max(1)) <= NUM_BINDINGS,
                    "the array of binding {} runs past the last binding",
                    binding,
                );
            }
        }
    }

    /// Returns the content hash of the layout combined with the stages using each binding.
    pub fn hash(&self, stages_for_bindings: &[vk::ShaderStageFlags; NUM_BINDINGS]) -> Hash {
        let mut h = Hasher::new();
        h.u32(self.sampled_image_mask);
        h.u32(self.storage_image_mask);
        h.u32(self.uniform_buffer_mask);
        h.u32(self.storage_buffer_mask);
        h.u32(self.sampled_texel_buffer_mask);
        h.u32(self.input_attachment_mask);
        h.u32(self.sampler_mask);
        h.u32(self.separate_image_mask);
        h.u32(self.fp_mask);
        h.u32(self.immutable_sampler_mask);
        h.u64(self.immutable_samplers);
        h.data(&self.array_size);

        for stages in stages_for_bindings {
            h.u32(stages.as_raw());
        }

        h.get()
    }
}
