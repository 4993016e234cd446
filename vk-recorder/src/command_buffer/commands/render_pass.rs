use crate::{
    command_buffer::{DirtyFlags, RawCommandBuffer, RecordingCommandBuffer, RenderPassState},
    pipeline::{Scissor, Viewport},
    render_pass::RenderPass,
    resource::ImageView,
};
use ash::vk;
use smallvec::SmallVec;
use std::sync::Arc;

/// Parameters to begin a render pass.
#[derive(Clone)]
pub struct RenderPassBeginInfo {
    pub render_pass: Arc<RenderPass>,

    /// The default value is a null handle, which must be replaced.
    pub framebuffer: vk::Framebuffer,

    /// The image views of the framebuffer, one per attachment of the render pass. They are
    /// needed to bind input attachments.
    ///
    /// The default value is empty.
    pub attachments: SmallVec<[Arc<ImageView>; 8]>,

    /// The area that is rendered to. The viewport and scissor are reset to cover it.
    pub render_area: Scissor,

    /// The default value is empty.
    pub clear_values: SmallVec<[vk::ClearValue; 8]>,
}

impl RenderPassBeginInfo {
    #[inline]
    pub fn new(render_pass: Arc<RenderPass>, render_area: Scissor) -> Self {
        RenderPassBeginInfo {
            render_pass,
            framebuffer: vk::Framebuffer::null(),
            attachments: SmallVec::new(),
            render_area,
            clear_values: SmallVec::new(),
        }
    }
}

/// # Commands to record render passes
///
/// Entering or leaving a render pass forgets everything that was bound, including the program.
impl<R: RawCommandBuffer> RecordingCommandBuffer<R> {
    /// Begins a render pass, starting at its first subpass.
    ///
    /// # Panics
    ///
    /// - Panics if a render pass is already active.
    /// - Panics if the number of attachments doesn't match the render pass.
    pub fn begin_render_pass(&mut self, begin_info: RenderPassBeginInfo) -> &mut Self {
        let RenderPassBeginInfo {
            render_pass,
            framebuffer,
            attachments,
            render_area,
            clear_values,
        } = begin_info;

        assert!(self.render_pass.is_none(), "a render pass is already active");
        assert_eq!(
            attachments.len(),
            render_pass.attachment_formats().len(),
            "the number of attachments doesn't match the render pass",
        );

        self.inner.begin_render_pass(
            render_pass.handle(),
            framebuffer,
            render_area.into(),
            &clear_values,
        );

        self.begin_context();
        self.render_pass = Some(RenderPassState {
            render_pass,
            subpass_index: 0,
            attachments,
        });

        self.viewport = Viewport {
            x: render_area.offset[0] as f32,
            y: render_area.offset[1] as f32,
            width: render_area.extent[0] as f32,
            height: render_area.extent[1] as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        self.scissor = render_area;

        self
    }

    /// Advances to the next subpass.
    ///
    /// # Panics
    ///
    /// - Panics if no render pass is active.
    /// - Panics if the current subpass is the last one.
    pub fn next_subpass(&mut self) -> &mut Self {
        let Some(state) = &mut self.render_pass else {
            panic!("no render pass is active");
        };
        assert!(
            (state.subpass_index as usize) + 1 < state.render_pass.subpass_count(),
            "the current subpass is the last one",
        );

        state.subpass_index += 1;
        self.inner.next_subpass();
        self.dirty |= DirtyFlags::PIPELINE;

        self
    }

    /// Ends the render pass.
    ///
    /// # Panics
    ///
    /// - Panics if no render pass is active.
    pub fn end_render_pass(&mut self) -> &mut Self {
        assert!(self.render_pass.is_some(), "no render pass is active");

        self.inner.end_render_pass();
        self.render_pass = None;
        self.begin_context();

        self
    }

    /// Returns the index of the current subpass, if a render pass is active.
    #[inline]
    pub fn subpass_index(&self) -> Option<u32> {
        self.render_pass.as_ref().map(|state| state.subpass_index)
    }
}
