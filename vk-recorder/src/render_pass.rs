//! The render pass compatibility information consumed by the recorder.
//!
//! Render passes and framebuffers are created elsewhere. The recorder only needs the handle to
//! begin the pass, the attachments read as input attachments by each subpass, and a hash that
//! identifies which render passes are compatible for pipeline creation.

use crate::{
    hash::{Hash, Hasher},
    macros::impl_id_counter,
};
use ash::vk;
use smallvec::SmallVec;
use std::{num::NonZero, sync::Arc};

/// The attachments used by one subpass, as indices into the attachments of the render pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SubpassDescription {
    pub color_attachments: SmallVec<[u32; 8]>,
    pub input_attachments: SmallVec<[u32; 8]>,
    pub depth_stencil_attachment: Option<u32>,
}

/// Parameters to describe a [`RenderPass`].
#[derive(Clone, Debug)]
pub struct RenderPassCreateInfo {
    /// The default value is a null handle, which must be replaced.
    pub handle: vk::RenderPass,

    /// The format of each attachment.
    ///
    /// The default value is empty.
    pub attachment_formats: SmallVec<[vk::Format; 8]>,

    /// The default value is `TYPE_1`.
    pub samples: vk::SampleCountFlags,

    /// The default value is a single subpass without attachments.
    pub subpasses: SmallVec<[SubpassDescription; 4]>,
}

impl Default for RenderPassCreateInfo {
    #[inline]
    fn default() -> Self {
        RenderPassCreateInfo {
            handle: vk::RenderPass::null(),
            attachment_formats: SmallVec::new(),
            samples: vk::SampleCountFlags::TYPE_1,
            subpasses: SmallVec::from_elem(SubpassDescription::default(), 1),
        }
    }
}

/// A render pass, identified for pipeline purposes by its compatibility hash.
#[derive(Debug)]
pub struct RenderPass {
    handle: vk::RenderPass,
    attachment_formats: SmallVec<[vk::Format; 8]>,
    samples: vk::SampleCountFlags,
    subpasses: SmallVec<[SubpassDescription; 4]>,
    compatibility_hash: Hash,
    id: NonZero<u64>,
}

impl RenderPass {
    /// # Panics
    ///
    /// - Panics if there are no subpasses.
    /// - Panics if a subpass refers to an attachment out of range.
    pub fn new(create_info: RenderPassCreateInfo) -> Arc<Self> {
        let RenderPassCreateInfo {
            handle,
            attachment_formats,
            samples,
            subpasses,
        } = create_info;

        assert!(!subpasses.is_empty(), "a render pass needs a subpass");

        let mut h = Hasher::new();
        h.u32(attachment_formats.len() as u32);

        for format in &attachment_formats {
            h.s32(format.as_raw());
        }

        h.u32(samples.as_raw());
        h.u32(subpasses.len() as u32);

        for subpass in &subpasses {
            let attachments = subpass
                .color_attachments
                .iter()
                .chain(&subpass.input_attachments)
                .chain(&subpass.depth_stencil_attachment);

            for &attachment in attachments {
                assert!(
                    (attachment as usize) < attachment_formats.len(),
                    "attachment {} is out of range",
                    attachment,
                );
            }

            h.u32(subpass.color_attachments.len() as u32);
            h.data(&subpass.color_attachments);
            h.u32(subpass.input_attachments.len() as u32);
            h.data(&subpass.input_attachments);
            h.u32(subpass.depth_stencil_attachment.map_or(u32::MAX, |a| a));
        }

        Arc::new(RenderPass {
            handle,
            attachment_formats,
            samples,
            subpasses,
            compatibility_hash: h.get(),
            id: Self::next_id(),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.handle
    }

    #[inline]
    pub fn attachment_formats(&self) -> &[vk::Format] {
        &self.attachment_formats
    }

    #[inline]
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    #[inline]
    pub fn subpass_count(&self) -> usize {
        self.subpasses.len()
    }

    #[inline]
    pub fn subpass(&self, index: u32) -> Option<&SubpassDescription> {
        self.subpasses.get(index as usize)
    }

    /// Returns a hash that is equal for render passes that are compatible.
    #[inline]
    pub fn compatibility_hash(&self) -> Hash {
        self.compatibility_hash
    }
}

impl_id_counter!(RenderPass);
