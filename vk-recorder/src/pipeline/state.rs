use super::{
    BlendFactor, BlendOp, CompareOp, CullMode, FrontFace, IndexType, PrimitiveTopology, StencilOp,
};
use crate::limits::NUM_SPEC_CONSTANTS;
use ash::vk;
use bytemuck::{Pod, Zeroable};

/// The stencil operations of one face.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct StencilOpState {
    pub fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub compare_op: CompareOp,
}

/// The fixed-function state baked into a pipeline.
///
/// The default value has every field zeroed, which is not a useful state. Use one of the
/// presets, such as [`PipelineState::opaque`], as a starting point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PipelineState {
    pub depth_write: bool,
    pub depth_test: bool,
    pub blend_enable: bool,

    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub depth_bias_enable: bool,

    pub depth_compare: CompareOp,

    pub stencil_test: bool,
    pub stencil_front: StencilOpState,
    pub stencil_back: StencilOpState,

    pub alpha_to_coverage: bool,
    pub alpha_to_one: bool,
    pub sample_shading: bool,

    pub src_color_blend: BlendFactor,
    pub dst_color_blend: BlendFactor,
    pub color_blend_op: BlendOp,
    pub src_alpha_blend: BlendFactor,
    pub dst_alpha_blend: BlendFactor,
    pub alpha_blend_op: BlendOp,

    pub primitive_restart: bool,
    pub topology: PrimitiveTopology,

    pub wireframe: bool,

    /// Whether the subgroup size of compute pipelines is controlled.
    pub subgroup_control_size: bool,
    pub subgroup_full_group: bool,
    /// Must be below 8.
    pub subgroup_minimum_size_log2: u8,
    /// Must be below 8.
    pub subgroup_maximum_size_log2: u8,

    pub conservative_raster: bool,

    /// Four bits per color attachment, one per component.
    pub write_mask: u32,
}

/// The number of words of a packed [`PipelineState`].
pub(crate) const PIPELINE_STATE_WORDS: usize = 4;

impl PipelineState {
    /// Opaque geometry with depth testing and back-face culling.
    pub fn opaque() -> Self {
        PipelineState {
            front_face: FrontFace::CounterClockwise,
            cull_mode: CullMode::Back,
            depth_test: true,
            depth_compare: CompareOp::LessOrEqual,
            depth_write: true,
            topology: PrimitiveTopology::TriangleList,
            write_mask: !0,
            ..Default::default()
        }
    }

    /// A full-screen quad drawn as a triangle strip, without depth testing.
    pub fn quad() -> Self {
        PipelineState {
            front_face: FrontFace::CounterClockwise,
            cull_mode: CullMode::None,
            depth_compare: CompareOp::Always,
            topology: PrimitiveTopology::TriangleStrip,
            write_mask: !0,
            ..Default::default()
        }
    }

    /// Opaque sprites drawn as triangle strips with depth testing.
    pub fn opaque_sprite() -> Self {
        PipelineState {
            front_face: FrontFace::CounterClockwise,
            cull_mode: CullMode::None,
            depth_compare: CompareOp::Less,
            depth_test: true,
            depth_write: true,
            topology: PrimitiveTopology::TriangleStrip,
            write_mask: !0,
            ..Default::default()
        }
    }

    /// Alpha-blended sprites, depth tested but not written.
    pub fn transparent_sprite() -> Self {
        PipelineState {
            front_face: FrontFace::CounterClockwise,
            cull_mode: CullMode::None,
            blend_enable: true,
            depth_test: true,
            depth_compare: CompareOp::Less,
            topology: PrimitiveTopology::TriangleStrip,
            write_mask: !0,
            src_color_blend: BlendFactor::SrcAlpha,
            dst_color_blend: BlendFactor::OneMinusSrcAlpha,
            color_blend_op: BlendOp::Add,
            src_alpha_blend: BlendFactor::Zero,
            dst_alpha_blend: BlendFactor::OneMinusSrcAlpha,
            alpha_blend_op: BlendOp::Add,
            ..Default::default()
        }
    }

    /// Returns whether blending reads the blend constants.
    pub fn uses_blend_constants(&self) -> bool {
        self.blend_enable
            && [
                self.src_color_blend,
                self.dst_color_blend,
                self.src_alpha_blend,
                self.dst_alpha_blend,
            ]
            .into_iter()
            .any(BlendFactor::uses_constant)
    }

    /// Returns the canonical packed form of the state, used for hashing.
    ///
    /// Two states are equal if and only if their packed forms are equal.
    ///
    /// # Panics
    ///
    /// - Panics if a subgroup size is out of range.
    pub fn words(&self) -> [u32; PIPELINE_STATE_WORDS] {
        let mut p = BitPacker::default();

        p.push(self.depth_write.into(), 1);
        p.push(self.depth_test.into(), 1);
        p.push(self.blend_enable.into(), 1);

        p.push(self.cull_mode.packed(), 2);
        p.push(self.front_face.packed(), 1);
        p.push(self.depth_bias_enable.into(), 1);

        p.push(self.depth_compare.packed(), 3);

        p.push(self.stencil_test.into(), 1);
        for face in [&self.stencil_front, &self.stencil_back] {
            p.push(face.fail_op.packed(), 3);
            p.push(face.pass_op.packed(), 3);
            p.push(face.depth_fail_op.packed(), 3);
            p.push(face.compare_op.packed(), 3);
        }

        p.push(self.alpha_to_coverage.into(), 1);
        p.push(self.alpha_to_one.into(), 1);
        p.push(self.sample_shading.into(), 1);

        p.push(self.src_color_blend.packed(), 5);
        p.push(self.dst_color_blend.packed(), 5);
        p.push(self.color_blend_op.packed(), 3);
        p.push(self.src_alpha_blend.packed(), 5);
        p.push(self.dst_alpha_blend.packed(), 5);
        p.push(self.alpha_blend_op.packed(), 3);

        p.push(self.primitive_restart.into(), 1);
        p.push(self.topology.packed(), 4);

        p.push(self.wireframe.into(), 1);

        p.push(self.subgroup_control_size.into(), 1);
        p.push(self.subgroup_full_group.into(), 1);
        p.push(self.subgroup_minimum_size_log2.into(), 3);
        p.push(self.subgroup_maximum_size_log2.into(), 3);

        p.push(self.conservative_raster.into(), 1);

        p.finish(self.write_mask)
    }
}

#[derive(Default)]
struct BitPacker {
    words: [u32; PIPELINE_STATE_WORDS],
    bit: u32,
}

impl BitPacker {
    fn push(&mut self, value: u32, bits: u32) {
        assert!(value < 1 << bits, "{} does not fit in {} bits", value, bits);

        let word = (self.bit / u32::BITS) as usize;
        let shift = self.bit % u32::BITS;
        self.words[word] |= value << shift;

        if shift + bits > u32::BITS {
            self.words[word + 1] |= value >> (u32::BITS - shift);
        }

        self.bit += bits;
    }

    fn finish(mut self, write_mask: u32) -> [u32; PIPELINE_STATE_WORDS] {
        // The write mask always gets its own word.
        debug_assert!(self.bit <= u32::BITS * (PIPELINE_STATE_WORDS as u32 - 1));
        self.words[PIPELINE_STATE_WORDS - 1] = write_mask;

        self.words
    }
}

/// State that is dynamic, unless the pipeline consumes it at compile time.
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct PotentialState {
    pub blend_constants: [f32; 4],
    pub spec_constants: [u32; NUM_SPEC_CONSTANTS],
    /// Which of `spec_constants` are set by the recorder.
    pub spec_constant_mask: u32,
}

// Compared by bits, so that a NaN constant doesn't keep the pipeline dirty.
impl PartialEq for PotentialState {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        bytemuck::bytes_of(self) == bytemuck::bytes_of(other)
    }
}

/// State set with commands right before drawing.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DynamicState {
    pub depth_bias_constant: f32,
    pub depth_bias_slope: f32,
    pub front_compare_mask: u8,
    pub front_write_mask: u8,
    pub front_reference: u8,
    pub back_compare_mask: u8,
    pub back_write_mask: u8,
    pub back_reference: u8,
}

/// A viewport, with its depth range.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl From<Viewport> for vk::Viewport {
    #[inline]
    fn from(val: Viewport) -> Self {
        vk::Viewport {
            x: val.x,
            y: val.y,
            width: val.width,
            height: val.height,
            min_depth: val.min_depth,
            max_depth: val.max_depth,
        }
    }
}

/// A scissor rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Scissor {
    pub offset: [i32; 2],
    pub extent: [u32; 2],
}

impl From<Scissor> for vk::Rect2D {
    #[inline]
    fn from(val: Scissor) -> Self {
        vk::Rect2D {
            offset: vk::Offset2D {
                x: val.offset[0],
                y: val.offset[1],
            },
            extent: vk::Extent2D {
                width: val.extent[0],
                height: val.extent[1],
            },
        }
    }
}

/// Where a vertex attribute is read from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub binding: u32,
    pub format: vk::Format,
    pub offset: u32,
}

/// The bound index buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct IndexState {
    pub buffer: vk::Buffer,
    pub offset: vk::DeviceSize,
    pub index_type: IndexType,
}
