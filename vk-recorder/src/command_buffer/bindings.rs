use crate::limits::{NUM_BINDINGS, NUM_DESCRIPTOR_SETS, PUSH_CONSTANT_SIZE};
use ash::vk::{self, Handle};

/// What is bound at one binding slot of a set.
///
/// Which fields are meaningful depends on the descriptor type the program's layout declares for
/// the slot. `cookie` identifies the bound image view, buffer or buffer view, and
/// `secondary_cookie` identifies the bound sampler.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct ResourceBinding {
    pub(crate) buffer: vk::DescriptorBufferInfo,
    pub(crate) dynamic_offset: u32,
    pub(crate) image_float: vk::DescriptorImageInfo,
    pub(crate) image_integer: vk::DescriptorImageInfo,
    pub(crate) buffer_view: vk::BufferView,
    pub(crate) cookie: u64,
    pub(crate) secondary_cookie: u64,
}

impl PartialEq for ResourceBinding {
    fn eq(&self, other: &Self) -> bool {
        fn image_eq(a: &vk::DescriptorImageInfo, b: &vk::DescriptorImageInfo) -> bool {
            a.sampler == b.sampler && a.image_view == b.image_view && a.image_layout == b.image_layout
        }

        self.buffer.buffer == other.buffer.buffer
            && self.buffer.offset == other.buffer.offset
            && self.buffer.range == other.buffer.range
            && self.dynamic_offset == other.dynamic_offset
            && image_eq(&self.image_float, &other.image_float)
            && image_eq(&self.image_integer, &other.image_integer)
            && self.buffer_view == other.buffer_view
            && self.cookie == other.cookie
            && self.secondary_cookie == other.secondary_cookie
    }
}

impl ResourceBinding {
    #[inline]
    pub(crate) fn is_buffer_bound(&self) -> bool {
        !self.buffer.buffer.is_null()
    }
}

/// Every resource binding of every set, plus the push constant block.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ResourceBindings {
    pub(crate) sets: [[ResourceBinding; NUM_BINDINGS]; NUM_DESCRIPTOR_SETS],
    pub(crate) push_constant_data: [u8; PUSH_CONSTANT_SIZE],
}

impl Default for ResourceBindings {
    fn default() -> Self {
        ResourceBindings {
            sets: [[ResourceBinding::default(); NUM_BINDINGS]; NUM_DESCRIPTOR_SETS],
            push_constant_data: [0; PUSH_CONSTANT_SIZE],
        }
    }
}

impl ResourceBindings {
    /// Forgets the identity of every bound resource, so that binding the same resource again
    /// is seen as a change.
    pub(crate) fn forget_cookies(&mut self) {
        for binding in self.sets.iter_mut().flatten() {
            binding.cookie = 0;
            binding.secondary_cookie = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ResourceBinding, ResourceBindings};
    use ash::vk::{self, Handle};

    #[test]
    fn equality_covers_handles() {
        let a = ResourceBinding::default();
        let mut b = a;
        assert_eq!(a, b);

        b.image_float.image_view = vk::ImageView::from_raw(3);
        assert_ne!(a, b);
    }

    #[test]
    fn forget_cookies() {
        let mut bindings = ResourceBindings::default();
        bindings.sets[2][5].cookie = 9;
        bindings.sets[2][5].buffer.buffer = vk::Buffer::from_raw(1);
        bindings.forget_cookies();

        assert_eq!(bindings.sets[2][5].cookie, 0);
        assert!(bindings.sets[2][5].is_buffer_bound());
    }
}
