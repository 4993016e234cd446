//! Recording commands with automatic state resolution.
//!
//! A [`RecordingCommandBuffer`] sits in front of a [`RawCommandBuffer`]. State setters only
//! update the recorder's copy of the state and mark it dirty when the value actually changes.
//! Draws and dispatches then resolve whatever is dirty, always in the same order:
//!
//! 1. the pipeline, if pipeline-affecting state changed, through the [`PipelineCache`],
//! 2. every dirty descriptor set used by the program, through the allocator of its layout,
//! 3. push constants and dynamic state,
//! 4. vertex buffers,
//!
//! and finally emit the draw or dispatch itself. Dirty flags are only ever cleared by this
//! resolution.
//!
//! The recorder is owned by a single thread. Its `thread_index` selects which per-thread cache of
//! the descriptor set allocators it uses, so two recorders recording at the same time must have
//! different thread indices.

pub use self::{
    commands::render_pass::RenderPassBeginInfo,
    raw::{RawCommandBuffer, ScratchAllocation, ScratchAllocator, ScratchUsage},
};
use self::bindings::ResourceBindings;
use crate::{
    limits::{NUM_DESCRIPTOR_SETS, NUM_VERTEX_ATTRIBUTES, NUM_VERTEX_BUFFERS},
    macros::state_bitflags,
    pipeline::{
        DynamicState, IndexState, PipelineCache, PipelineCompileMode, PipelineLayout,
        PipelineState, PotentialState, Scissor, VertexAttribute, VertexInputRate, Viewport,
    },
    render_pass::RenderPass,
    resource::ImageView,
    shader::Program,
    VulkanError,
};
use ash::vk;
use smallvec::SmallVec;
use std::{fmt, sync::Arc};

mod bindings;
mod commands;
mod raw;

pub type Result<T = (), E = VulkanError> = std::result::Result<T, E>;

state_bitflags! {
    /// Recorder state that has diverged from what was last emitted.
    DirtyFlags impl {
        /// The state set with dynamic state commands.
        pub const DYNAMIC: Self = Self::VIEWPORT
            .union(Self::SCISSOR)
            .union(Self::DEPTH_BIAS)
            .union(Self::STENCIL_REFERENCE);

        /// The state that requires resolving the pipeline.
        pub const PIPELINE_STATE: Self = Self::STATIC_STATE
            .union(Self::PIPELINE)
            .union(Self::STATIC_VERTEX);
    }
    = u32;

    /// The [`PipelineState`] or the baked part of the [`PotentialState`] changed.
    STATIC_STATE = 1 << 0,

    /// The program or the render pass changed.
    PIPELINE = 1 << 1,

    VIEWPORT = 1 << 2,

    SCISSOR = 1 << 3,

    DEPTH_BIAS = 1 << 4,

    /// The stencil compare masks, write masks or references changed.
    STENCIL_REFERENCE = 1 << 5,

    /// The vertex attributes, or the strides or input rates of the vertex buffers changed.
    STATIC_VERTEX = 1 << 6,

    PUSH_CONSTANTS = 1 << 7,
}

state_bitflags! {
    /// Selects the state captured by [`RecordingCommandBuffer::save_state`].
    SavedStateFlags impl {
        /// Returns the flag for the bindings of `set`.
        ///
        /// # Panics
        ///
        /// - Panics if `set` is not below [`NUM_DESCRIPTOR_SETS`].
        pub const fn bindings(set: u32) -> Self {
            assert!((set as usize) < NUM_DESCRIPTOR_SETS);

            Self(1 << set)
        }

        /// The bindings of every set.
        pub const ALL_BINDINGS: Self = Self((1 << NUM_DESCRIPTOR_SETS) - 1);
    }
    = u32;

    BINDINGS_0 = 1 << 0,
    BINDINGS_1 = 1 << 1,
    BINDINGS_2 = 1 << 2,
    BINDINGS_3 = 1 << 3,
    BINDINGS_4 = 1 << 4,
    BINDINGS_5 = 1 << 5,
    BINDINGS_6 = 1 << 6,
    BINDINGS_7 = 1 << 7,
    VIEWPORT = 1 << 8,
    SCISSOR = 1 << 9,

    /// The static, potentially static and dynamic state blocks.
    RENDER_STATE = 1 << 10,

    PUSH_CONSTANT = 1 << 11,
}

/// Parameters to create a [`RecordingCommandBuffer`].
pub struct CommandBufferCreateInfo {
    /// The per-thread descriptor set cache to use.
    ///
    /// The default value is `0`.
    pub thread_index: usize,

    /// The default value is [`PipelineCompileMode::Blocking`].
    pub compile_mode: PipelineCompileMode,

    /// Provides memory for `allocate_*_data`.
    ///
    /// The default value is `None`.
    pub scratch_allocator: Option<Box<dyn ScratchAllocator>>,
}

impl Default for CommandBufferCreateInfo {
    #[inline]
    fn default() -> Self {
        CommandBufferCreateInfo {
            thread_index: 0,
            compile_mode: PipelineCompileMode::Blocking,
            scratch_allocator: None,
        }
    }
}

/// A subset of the recorder state, captured by [`RecordingCommandBuffer::save_state`].
#[derive(Clone, Debug)]
pub struct SavedState {
    flags: SavedStateFlags,
    bindings: Box<ResourceBindings>,
    viewport: Viewport,
    scissor: Scissor,
    static_state: PipelineState,
    potential_static_state: PotentialState,
    dynamic_state: DynamicState,
}

impl SavedState {
    #[inline]
    pub fn flags(&self) -> SavedStateFlags {
        self.flags
    }
}

struct RenderPassState {
    render_pass: Arc<RenderPass>,
    subpass_index: u32,
    attachments: SmallVec<[Arc<ImageView>; 8]>,
}

/// Records commands into a [`RawCommandBuffer`], resolving pipelines and descriptor sets from
/// the accumulated state.
pub struct RecordingCommandBuffer<R> {
    inner: R,
    pipeline_cache: Arc<PipelineCache>,
    thread_index: usize,
    compile_mode: PipelineCompileMode,
    scratch_allocator: Option<Box<dyn ScratchAllocator>>,

    render_pass: Option<RenderPassState>,
    program: Option<Arc<Program>>,
    current_layout: Option<Arc<PipelineLayout>>,
    current_pipeline: vk::Pipeline,

    static_state: PipelineState,
    potential_static_state: PotentialState,
    dynamic_state: DynamicState,
    viewport: Viewport,
    scissor: Scissor,

    attributes: [VertexAttribute; NUM_VERTEX_ATTRIBUTES],
    strides: [u32; NUM_VERTEX_BUFFERS],
    input_rates: [VertexInputRate; NUM_VERTEX_BUFFERS],
    vertex_buffers: [vk::Buffer; NUM_VERTEX_BUFFERS],
    vertex_offsets: [vk::DeviceSize; NUM_VERTEX_BUFFERS],
    index: IndexState,

    bindings: Box<ResourceBindings>,
    bindless_sets: [vk::DescriptorSet; NUM_DESCRIPTOR_SETS],
    allocated_sets: [vk::DescriptorSet; NUM_DESCRIPTOR_SETS],

    dirty: DirtyFlags,
    dirty_sets: u32,
    dirty_sets_dynamic: u32,
    dirty_vertex_buffers: u32,
    active_vertex_buffers: u32,
}

impl<R: RawCommandBuffer> RecordingCommandBuffer<R> {
    /// Starts recording into `inner`, outside of any render pass.
    pub fn new(
        inner: R,
        pipeline_cache: Arc<PipelineCache>,
        create_info: CommandBufferCreateInfo,
    ) -> Self {
        let CommandBufferCreateInfo {
            thread_index,
            compile_mode,
            scratch_allocator,
        } = create_info;

        let mut cb = RecordingCommandBuffer {
            inner,
            pipeline_cache,
            thread_index,
            compile_mode,
            scratch_allocator,

            render_pass: None,
            program: None,
            current_layout: None,
            current_pipeline: vk::Pipeline::null(),

            static_state: PipelineState::default(),
            potential_static_state: PotentialState::default(),
            dynamic_state: DynamicState::default(),
            viewport: Viewport::default(),
            scissor: Scissor::default(),

            attributes: Default::default(),
            strides: [0; NUM_VERTEX_BUFFERS],
            input_rates: Default::default(),
            vertex_buffers: [vk::Buffer::null(); NUM_VERTEX_BUFFERS],
            vertex_offsets: [0; NUM_VERTEX_BUFFERS],
            index: IndexState::default(),

            bindings: Box::default(),
            bindless_sets: [vk::DescriptorSet::null(); NUM_DESCRIPTOR_SETS],
            allocated_sets: [vk::DescriptorSet::null(); NUM_DESCRIPTOR_SETS],

            dirty: DirtyFlags::empty(),
            dirty_sets: 0,
            dirty_sets_dynamic: 0,
            dirty_vertex_buffers: 0,
            active_vertex_buffers: 0,
        };
        cb.begin_context();

        cb
    }

    /// Forgets everything that was emitted, so that the next draw or dispatch emits all of its
    /// state again. Done whenever the command buffer enters or leaves a render pass.
    fn begin_context(&mut self) {
        self.dirty = DirtyFlags::all();
        self.dirty_sets = !0;
        self.dirty_sets_dynamic = 0;
        self.dirty_vertex_buffers = !0;
        self.current_pipeline = vk::Pipeline::null();
        self.current_layout = None;
        self.program = None;
        self.bindings.forget_cookies();
        self.index = IndexState::default();
        self.vertex_buffers = [vk::Buffer::null(); NUM_VERTEX_BUFFERS];
    }

    /// Returns the command buffer commands are emitted into.
    #[inline]
    pub fn inner(&self) -> &R {
        &self.inner
    }

    #[inline]
    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Ends recording and returns the command buffer commands were emitted into.
    #[inline]
    pub fn into_inner(self) -> R {
        self.inner
    }

    #[inline]
    pub fn pipeline_cache(&self) -> &Arc<PipelineCache> {
        &self.pipeline_cache
    }

    #[inline]
    pub fn thread_index(&self) -> usize {
        self.thread_index
    }

    #[inline]
    pub fn compile_mode(&self) -> PipelineCompileMode {
        self.compile_mode
    }

    #[inline]
    pub fn set_compile_mode(&mut self, mode: PipelineCompileMode) -> &mut Self {
        self.compile_mode = mode;

        self
    }

    /// Returns whether commands are recorded outside of a render pass, where only dispatches
    /// are allowed.
    #[inline]
    pub fn is_compute(&self) -> bool {
        self.render_pass.is_none()
    }

    #[inline]
    pub fn program(&self) -> Option<&Arc<Program>> {
        self.program.as_ref()
    }

    /// Returns the pipeline bound by the last resolution, which may be a null handle.
    #[inline]
    pub fn current_pipeline(&self) -> vk::Pipeline {
        self.current_pipeline
    }

    #[inline]
    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }

    /// Returns the sets whose descriptor set must be resolved again.
    #[inline]
    pub fn dirty_sets(&self) -> u32 {
        self.dirty_sets
    }

    /// Returns the sets whose descriptor set only needs to be bound again with new dynamic
    /// offsets.
    #[inline]
    pub fn dirty_sets_dynamic(&self) -> u32 {
        self.dirty_sets_dynamic
    }

    #[inline]
    pub fn static_state(&self) -> &PipelineState {
        &self.static_state
    }

    #[inline]
    pub fn potential_static_state(&self) -> &PotentialState {
        &self.potential_static_state
    }

    #[inline]
    pub fn dynamic_state(&self) -> &DynamicState {
        &self.dynamic_state
    }

    #[inline]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    #[inline]
    pub fn scissor(&self) -> Scissor {
        self.scissor
    }

    #[inline]
    fn bind_point(&self) -> vk::PipelineBindPoint {
        if self.is_compute() {
            vk::PipelineBindPoint::COMPUTE
        } else {
            vk::PipelineBindPoint::GRAPHICS
        }
    }

    /// Captures the state selected by `flags`.
    pub fn save_state(&self, flags: SavedStateFlags) -> SavedState {
        let mut bindings = Box::<ResourceBindings>::default();

        for set in 0..NUM_DESCRIPTOR_SETS {
            if flags.intersects(SavedStateFlags::bindings(set as u32)) {
                bindings.sets[set] = self.bindings.sets[set];
            }
        }

        if flags.intersects(SavedStateFlags::PUSH_CONSTANT) {
            bindings.push_constant_data = self.bindings.push_constant_data;
        }

        SavedState {
            flags,
            bindings,
            viewport: self.viewport,
            scissor: self.scissor,
            static_state: self.static_state,
            potential_static_state: self.potential_static_state,
            dynamic_state: self.dynamic_state,
        }
    }

    /// Restores the state captured by [`save_state`].
    ///
    /// Everything restored is marked dirty, whether it changed or not.
    ///
    /// [`save_state`]: Self::save_state
    pub fn restore_state(&mut self, state: &SavedState) -> &mut Self {
        let flags = state.flags;

        for set in 0..NUM_DESCRIPTOR_SETS {
            if flags.intersects(SavedStateFlags::bindings(set as u32)) {
                self.bindings.sets[set] = state.bindings.sets[set];
                self.dirty_sets |= 1 << set;
            }
        }

        if flags.intersects(SavedStateFlags::PUSH_CONSTANT) {
            self.bindings.push_constant_data = state.bindings.push_constant_data;
            self.dirty |= DirtyFlags::PUSH_CONSTANTS;
        }

        if flags.intersects(SavedStateFlags::VIEWPORT) {
            self.viewport = state.viewport;
            self.dirty |= DirtyFlags::VIEWPORT;
        }

        if flags.intersects(SavedStateFlags::SCISSOR) {
            self.scissor = state.scissor;
            self.dirty |= DirtyFlags::SCISSOR;
        }

        if flags.intersects(SavedStateFlags::RENDER_STATE) {
            self.static_state = state.static_state;
            self.potential_static_state = state.potential_static_state;
            self.dynamic_state = state.dynamic_state;
            self.dirty |= DirtyFlags::STATIC_STATE | DirtyFlags::PIPELINE | DirtyFlags::DYNAMIC;
        }

        self
    }

    #[cfg(test)]
    pub(crate) fn clear_dirty_for_tests(&mut self) {
        self.dirty = DirtyFlags::empty();
        self.dirty_sets = 0;
        self.dirty_sets_dynamic = 0;
        self.dirty_vertex_buffers = 0;
    }
}

impl<R> fmt::Debug for RecordingCommandBuffer<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingCommandBuffer")
            .field("thread_index", &self.thread_index)
            .field("compile_mode", &self.compile_mode)
            .field("is_compute", &self.render_pass.is_none())
            .field("program", &self.program)
            .field("current_pipeline", &self.current_pipeline)
            .field("dirty", &self.dirty)
            .field("dirty_sets", &format_args!("{:#b}", self.dirty_sets))
            .finish_non_exhaustive()
    }
}
