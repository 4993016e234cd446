use super::{PipelineState, PotentialState, VertexAttribute, VertexInputRate};
use crate::{
    bits::iter_bits,
    hash::{Hash, Hasher},
    limits::{NUM_VERTEX_ATTRIBUTES, NUM_VERTEX_BUFFERS},
    render_pass::RenderPass,
    shader::Program,
};
use std::sync::Arc;

/// Everything needed to build a pipeline, captured from the recorder right before a draw or a
/// dispatch.
///
/// The hash is computed once at construction, and only covers what the pipeline actually
/// consumes: vertex input that the program doesn't read, blend constants that the blend state
/// doesn't read and specialization constants that the program doesn't declare are left out.
#[derive(Clone, Debug)]
pub struct DeferredPipelineCompile {
    pub program: Arc<Program>,

    /// The render pass the pipeline is compatible with. `None` for compute pipelines.
    pub render_pass: Option<Arc<RenderPass>>,
    pub subpass_index: u32,

    pub static_state: PipelineState,
    pub potential_static_state: PotentialState,

    pub attributes: [VertexAttribute; NUM_VERTEX_ATTRIBUTES],
    pub strides: [u32; NUM_VERTEX_BUFFERS],
    pub input_rates: [VertexInputRate; NUM_VERTEX_BUFFERS],

    active_vertex_buffers: u32,
    hash: Hash,
}

impl DeferredPipelineCompile {
    /// Captures the state of a graphics pipeline.
    ///
    /// # Panics
    ///
    /// - Panics if `program` is a compute program.
    /// - Panics if `subpass_index` is out of range of `render_pass`.
    /// - Panics if an attribute read by the program refers to a vertex buffer binding out of
    ///   range.
    pub fn graphics(
        program: Arc<Program>,
        render_pass: Arc<RenderPass>,
        subpass_index: u32,
        static_state: &PipelineState,
        potential_static_state: &PotentialState,
        attributes: &[VertexAttribute; NUM_VERTEX_ATTRIBUTES],
        strides: &[u32; NUM_VERTEX_BUFFERS],
        input_rates: &[VertexInputRate; NUM_VERTEX_BUFFERS],
    ) -> Self {
        assert!(!program.is_compute(), "the program is a compute program");
        assert!(
            (subpass_index as usize) < render_pass.subpass_count(),
            "subpass {} is out of range of the render pass",
            subpass_index,
        );

        let layout = program.layout().resource_layout();
        let mut h = Hasher::new();
        let mut active_vertex_buffers = 0;

        for bit in iter_bits(layout.attribute_mask) {
            let attribute = &attributes[bit as usize];
            assert!(
                (attribute.binding as usize) < NUM_VERTEX_BUFFERS,
                "vertex attribute {} reads from binding {}, which is out of range",
                bit,
                attribute.binding,
            );

            h.u32(bit);
            active_vertex_buffers |= 1 << attribute.binding;
            h.u32(attribute.binding);
            h.s32(attribute.format.as_raw());
            h.u32(attribute.offset);
        }

        for binding in iter_bits(active_vertex_buffers) {
            h.u32(input_rates[binding as usize].packed());
            h.u32(strides[binding as usize]);
        }

        h.u64(render_pass.compatibility_hash());
        h.u32(subpass_index);
        h.u64(program.id().get());
        h.data(&static_state.words());

        if static_state.uses_blend_constants() {
            for constant in potential_static_state.blend_constants {
                h.f32(constant);
            }
        }

        hash_spec_constants(
            &mut h,
            potential_static_state,
            layout.combined_spec_constant_mask,
        );

        DeferredPipelineCompile {
            program,
            render_pass: Some(render_pass),
            subpass_index,
            static_state: *static_state,
            potential_static_state: *potential_static_state,
            attributes: *attributes,
            strides: *strides,
            input_rates: *input_rates,
            active_vertex_buffers,
            hash: h.get(),
        }
    }

    /// Captures the state of a compute pipeline.
    ///
    /// # Panics
    ///
    /// - Panics if `program` is not a compute program.
    pub fn compute(
        program: Arc<Program>,
        static_state: &PipelineState,
        potential_static_state: &PotentialState,
    ) -> Self {
        assert!(program.is_compute(), "the program is not a compute program");

        let layout = program.layout().resource_layout();
        let mut h = Hasher::new();
        h.u64(program.id().get());

        if static_state.subgroup_control_size {
            h.u32(1);
            h.u32(static_state.subgroup_minimum_size_log2.into());
            h.u32(static_state.subgroup_maximum_size_log2.into());
            h.u32(static_state.subgroup_full_group.into());
        } else {
            h.u32(0);
        }

        hash_spec_constants(
            &mut h,
            potential_static_state,
            layout.combined_spec_constant_mask,
        );

        DeferredPipelineCompile {
            program,
            render_pass: None,
            subpass_index: 0,
            static_state: *static_state,
            potential_static_state: *potential_static_state,
            attributes: Default::default(),
            strides: Default::default(),
            input_rates: Default::default(),
            active_vertex_buffers: 0,
            hash: h.get(),
        }
    }

    /// Returns the structural hash identifying the pipeline.
    #[inline]
    pub fn hash(&self) -> Hash {
        self.hash
    }

    /// Returns the vertex buffer bindings read by the program.
    #[inline]
    pub fn active_vertex_buffers(&self) -> u32 {
        self.active_vertex_buffers
    }

    #[inline]
    pub fn is_compute(&self) -> bool {
        self.render_pass.is_none()
    }
}

fn hash_spec_constants(h: &mut Hasher, state: &PotentialState, program_mask: u32) {
    let mask = state.spec_constant_mask & program_mask;
    h.u32(mask);

    for index in iter_bits(mask) {
        h.u32(state.spec_constants[index as usize]);
    }
}
