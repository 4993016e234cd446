//! Pipeline state and the resolution of that state into pipeline objects.
//!
//! The fixed-function state tracked by the recorder is split by how it reaches the device:
//!
//! - [`PipelineState`] is baked into the pipeline. It is bit-packed into a few words that are
//!   hashed as a whole.
//! - [`PotentialState`] holds blend constants and specialization constants. They are only part
//!   of the pipeline when the program or the blend state actually consumes them.
//! - [`DynamicState`] never affects the pipeline and is set with state commands before drawing.
//!
//! When a draw finds pipeline-affecting state dirty, a [`DeferredPipelineCompile`] is built from
//! the live state and resolved by the [`PipelineCache`].

pub use self::{
    cache::{PipelineCache, PipelineCompileMode, PipelineCompletion},
    compile::DeferredPipelineCompile,
    layout::{CombinedResourceLayout, PipelineLayout},
    state::{
        DynamicState, IndexState, PipelineState, PotentialState, Scissor, StencilOpState,
        VertexAttribute, Viewport,
    },
};
use crate::macros::vulkan_enum;

mod cache;
mod compile;
mod layout;
mod state;

vulkan_enum! {
    /// Specifies how two values should be compared to decide whether a test passes or fails.
    CompareOp = CompareOp(i32);

    /// The test never passes.
    Never = NEVER,

    /// The test passes if `value < reference_value`.
    Less = LESS,

    /// The test passes if `value == reference_value`.
    Equal = EQUAL,

    /// The test passes if `value <= reference_value`.
    LessOrEqual = LESS_OR_EQUAL,

    /// The test passes if `value > reference_value`.
    Greater = GREATER,

    /// The test passes if `value != reference_value`.
    NotEqual = NOT_EQUAL,

    /// The test passes if `value >= reference_value`.
    GreaterOrEqual = GREATER_OR_EQUAL,

    /// The test always passes.
    Always = ALWAYS,
}

vulkan_enum! {
    /// Operation to perform on the stencil buffer.
    StencilOp = StencilOp(i32);

    Keep = KEEP,
    Zero = ZERO,
    Replace = REPLACE,
    IncrementAndClamp = INCREMENT_AND_CLAMP,
    DecrementAndClamp = DECREMENT_AND_CLAMP,
    Invert = INVERT,
    IncrementAndWrap = INCREMENT_AND_WRAP,
    DecrementAndWrap = DECREMENT_AND_WRAP,
}

vulkan_enum! {
    /// The factor a color or alpha component is multiplied by before blending.
    BlendFactor impl {
        /// Returns whether the factor reads the blend constants.
        #[inline]
        pub fn uses_constant(self) -> bool {
            matches!(
                self,
                BlendFactor::ConstantColor
                    | BlendFactor::OneMinusConstantColor
                    | BlendFactor::ConstantAlpha
                    | BlendFactor::OneMinusConstantAlpha
            )
        }
    }
    = BlendFactor(i32);

    Zero = ZERO,
    One = ONE,
    SrcColor = SRC_COLOR,
    OneMinusSrcColor = ONE_MINUS_SRC_COLOR,
    DstColor = DST_COLOR,
    OneMinusDstColor = ONE_MINUS_DST_COLOR,
    SrcAlpha = SRC_ALPHA,
    OneMinusSrcAlpha = ONE_MINUS_SRC_ALPHA,
    DstAlpha = DST_ALPHA,
    OneMinusDstAlpha = ONE_MINUS_DST_ALPHA,
    ConstantColor = CONSTANT_COLOR,
    OneMinusConstantColor = ONE_MINUS_CONSTANT_COLOR,
    ConstantAlpha = CONSTANT_ALPHA,
    OneMinusConstantAlpha = ONE_MINUS_CONSTANT_ALPHA,
    SrcAlphaSaturate = SRC_ALPHA_SATURATE,
    Src1Color = SRC1_COLOR,
    OneMinusSrc1Color = ONE_MINUS_SRC1_COLOR,
    Src1Alpha = SRC1_ALPHA,
    OneMinusSrc1Alpha = ONE_MINUS_SRC1_ALPHA,
}

vulkan_enum! {
    /// The arithmetic operation combining the source and destination of a blend.
    BlendOp = BlendOp(i32);

    Add = ADD,
    Subtract = SUBTRACT,
    ReverseSubtract = REVERSE_SUBTRACT,
    Min = MIN,
    Max = MAX,
}

vulkan_enum! {
    /// Specifies the culling mode.
    CullMode = CullModeFlags(u32);

    /// No culling.
    None = NONE,

    /// The faces facing the front of the screen (ie. facing the user) will be removed.
    Front = FRONT,

    /// The faces facing the back of the screen will be removed.
    Back = BACK,

    /// All faces will be removed.
    FrontAndBack = FRONT_AND_BACK,
}

vulkan_enum! {
    /// Specifies which triangle orientation corresponds to the front of the triangle.
    FrontFace = FrontFace(i32);

    /// A triangle is considered front-facing if its vertices go counter-clockwise on the screen.
    CounterClockwise = COUNTER_CLOCKWISE,

    /// A triangle is considered front-facing if its vertices go clockwise on the screen.
    Clockwise = CLOCKWISE,
}

vulkan_enum! {
    /// Describes how vertices must be grouped together to form primitives.
    PrimitiveTopology = PrimitiveTopology(i32);

    PointList = POINT_LIST,
    LineList = LINE_LIST,
    LineStrip = LINE_STRIP,
    TriangleList = TRIANGLE_LIST,
    TriangleStrip = TRIANGLE_STRIP,
    TriangleFan = TRIANGLE_FAN,
    LineListWithAdjacency = LINE_LIST_WITH_ADJACENCY,
    LineStripWithAdjacency = LINE_STRIP_WITH_ADJACENCY,
    TriangleListWithAdjacency = TRIANGLE_LIST_WITH_ADJACENCY,
    TriangleStripWithAdjacency = TRIANGLE_STRIP_WITH_ADJACENCY,
    PatchList = PATCH_LIST,
}

vulkan_enum! {
    /// How the vertex source of a binding advances.
    VertexInputRate = VertexInputRate(i32);

    /// Each vertex reads the next element.
    Vertex = VERTEX,

    /// Each instance reads the next element.
    Instance = INSTANCE,
}

vulkan_enum! {
    /// The type of the indices of an index buffer.
    IndexType = IndexType(i32);

    Uint16 = UINT16,
    Uint32 = UINT32,
}
