//! Programs: a set of shader modules together with their pipeline layout.

use crate::{macros::impl_id_counter, pipeline::PipelineLayout};
use ash::vk;
use std::{num::NonZero, sync::Arc};

/// A shader stage a program can have a module for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ShaderStage {
    Vertex = 0,
    TessellationControl = 1,
    TessellationEvaluation = 2,
    Geometry = 3,
    Fragment = 4,
    Compute = 5,
}

impl ShaderStage {
    pub const COUNT: usize = 6;

    pub const ALL: [ShaderStage; Self::COUNT] = [
        ShaderStage::Vertex,
        ShaderStage::TessellationControl,
        ShaderStage::TessellationEvaluation,
        ShaderStage::Geometry,
        ShaderStage::Fragment,
        ShaderStage::Compute,
    ];

    #[inline]
    pub fn flags(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::TessellationControl => vk::ShaderStageFlags::TESSELLATION_CONTROL,
            ShaderStage::TessellationEvaluation => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
            ShaderStage::Geometry => vk::ShaderStageFlags::GEOMETRY,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
        }
    }
}

/// A linked set of shader modules, either a single compute shader or a set of graphics stages.
///
/// Two programs are only equal if they are the same object, the id of a program is hashed into
/// the pipelines built from it.
#[derive(Debug)]
pub struct Program {
    id: NonZero<u64>,
    shaders: [Option<vk::ShaderModule>; ShaderStage::COUNT],
    layout: Arc<PipelineLayout>,
}

impl Program {
    /// # Panics
    ///
    /// - Panics if `shaders` is empty.
    /// - Panics if `shaders` mixes the compute stage with graphics stages.
    /// - Panics if a graphics program has no vertex shader.
    pub fn new(
        shaders: impl IntoIterator<Item = (ShaderStage, vk::ShaderModule)>,
        layout: Arc<PipelineLayout>,
    ) -> Arc<Self> {
        let mut modules = [None; ShaderStage::COUNT];

        for (stage, module) in shaders {
            modules[stage as usize] = Some(module);
        }

        let has_compute = modules[ShaderStage::Compute as usize].is_some();
        let graphics_count = modules[..ShaderStage::Compute as usize]
            .iter()
            .filter(|module| module.is_some())
            .count();

        assert!(
            has_compute || graphics_count > 0,
            "a program needs at least one shader",
        );
        assert!(
            !(has_compute && graphics_count > 0),
            "a program cannot mix the compute stage with graphics stages",
        );
        assert!(
            has_compute || modules[ShaderStage::Vertex as usize].is_some(),
            "a graphics program needs a vertex shader",
        );

        Arc::new(Program {
            id: Self::next_id(),
            shaders: modules,
            layout,
        })
    }

    #[inline]
    pub fn shader(&self, stage: ShaderStage) -> Option<vk::ShaderModule> {
        self.shaders[stage as usize]
    }

    /// Returns the stages that have a module.
    pub fn stages(&self) -> impl Iterator<Item = (ShaderStage, vk::ShaderModule)> + '_ {
        ShaderStage::ALL
            .into_iter()
            .filter_map(|stage| Some((stage, self.shader(stage)?)))
    }

    #[inline]
    pub fn is_compute(&self) -> bool {
        self.shaders[ShaderStage::Compute as usize].is_some()
    }

    #[inline]
    pub fn layout(&self) -> &Arc<PipelineLayout> {
        &self.layout
    }
}

impl_id_counter!(Program);

#[cfg(test)]
mod tests {
    use super::{Program, ShaderStage};
    use crate::tests::{empty_pipeline_layout, MockDevice};
    use ash::vk::{self, Handle};

    #[test]
    fn graphics_and_compute() {
        let device = MockDevice::new();
        let layout = empty_pipeline_layout(&device);

        let graphics = Program::new(
            [
                (ShaderStage::Vertex, vk::ShaderModule::from_raw(1)),
                (ShaderStage::Fragment, vk::ShaderModule::from_raw(2)),
            ],
            layout.clone(),
        );
        assert!(!graphics.is_compute());
        assert_eq!(graphics.stages().count(), 2);

        let compute = Program::new(
            [(ShaderStage::Compute, vk::ShaderModule::from_raw(3))],
            layout,
        );
        assert!(compute.is_compute());
        assert_ne!(graphics.id(), compute.id());
    }

    #[test]
    fn mixed_stages() {
        let device = MockDevice::new();
        let layout = empty_pipeline_layout(&device);

        assert_should_panic!("cannot mix", {
            Program::new(
                [
                    (ShaderStage::Vertex, vk::ShaderModule::from_raw(1)),
                    (ShaderStage::Compute, vk::ShaderModule::from_raw(2)),
                ],
                layout,
            );
        });
    }

    #[test]
    fn missing_vertex() {
        let device = MockDevice::new();
        let layout = empty_pipeline_layout(&device);

        assert_should_panic!("vertex shader", {
            Program::new(
                [(ShaderStage::Fragment, vk::ShaderModule::from_raw(1))],
                layout,
            );
        });
    }
}
