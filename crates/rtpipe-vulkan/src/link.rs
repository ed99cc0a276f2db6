//! Shader group linking.
//!
//! Turns a [`ProgramDescriptor`] into the stage and group arrays of a Vulkan
//! ray tracing pipeline. Stages are deduplicated by (library, entry point,
//! stage kind); groups are emitted one per registration, in registration
//! order, so a registration's group index is its position.

use ash::vk;
use hashbrown::HashMap;
use rtpipe_core::{Result, RtError};
use rtpipe_program::{EntryPointRole, EntryPointShaders, ProgramDescriptor};

/// Shader stage of a ray tracing entry point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageKind {
    RayGeneration,
    Miss,
    ClosestHit,
    AnyHit,
    Intersection,
}

impl StageKind {
    /// Vulkan stage flag.
    #[must_use]
    pub const fn flags(self) -> vk::ShaderStageFlags {
        match self {
            Self::RayGeneration => vk::ShaderStageFlags::RAYGEN_KHR,
            Self::Miss => vk::ShaderStageFlags::MISS_KHR,
            Self::ClosestHit => vk::ShaderStageFlags::CLOSEST_HIT_KHR,
            Self::AnyHit => vk::ShaderStageFlags::ANY_HIT_KHR,
            Self::Intersection => vk::ShaderStageFlags::INTERSECTION_KHR,
        }
    }

    /// Short lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::RayGeneration => "raygen",
            Self::Miss => "miss",
            Self::ClosestHit => "closesthit",
            Self::AnyHit => "anyhit",
            Self::Intersection => "intersection",
        }
    }
}

/// A unique shader stage of the pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StageKey {
    /// Index into the descriptor's library list.
    pub library: usize,
    /// Entry point symbol.
    pub entry_point: String,
    /// Stage kind.
    pub kind: StageKind,
}

/// Vulkan shader group type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupKind {
    /// Ray generation or miss.
    General,
    /// Hit group for built-in triangle intersection.
    TrianglesHit,
    /// Hit group with a custom intersection shader.
    ProceduralHit,
}

/// One shader group, referring to stages by index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkedGroup {
    pub role: EntryPointRole,
    pub ordinal: u32,
    pub kind: GroupKind,
    pub general: Option<u32>,
    pub closest_hit: Option<u32>,
    pub any_hit: Option<u32>,
    pub intersection: Option<u32>,
}

impl LinkedGroup {
    /// Vulkan create info for this group.
    #[must_use]
    pub fn create_info(&self) -> vk::RayTracingShaderGroupCreateInfoKHR<'static> {
        let ty = match self.kind {
            GroupKind::General => vk::RayTracingShaderGroupTypeKHR::GENERAL,
            GroupKind::TrianglesHit => vk::RayTracingShaderGroupTypeKHR::TRIANGLES_HIT_GROUP,
            GroupKind::ProceduralHit => vk::RayTracingShaderGroupTypeKHR::PROCEDURAL_HIT_GROUP,
        };
        let unused = |stage: Option<u32>| stage.unwrap_or(vk::SHADER_UNUSED_KHR);
        vk::RayTracingShaderGroupCreateInfoKHR::default()
            .ty(ty)
            .general_shader(unused(self.general))
            .closest_hit_shader(unused(self.closest_hit))
            .any_hit_shader(unused(self.any_hit))
            .intersection_shader(unused(self.intersection))
    }
}

/// Stage and group arrays of a linked program.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShaderGroupLayout {
    stages: Vec<StageKey>,
    groups: Vec<LinkedGroup>,
}

impl ShaderGroupLayout {
    /// Link every registration of `desc`.
    pub fn link(desc: &ProgramDescriptor) -> Result<Self> {
        let mut layout = Self::default();
        let mut stage_lookup: HashMap<StageKey, u32> = HashMap::new();

        for registration in desc.registrations() {
            if desc.library(registration.library).is_none() {
                return Err(RtError::CompilationFailed(format!(
                    "{} entry point {} refers to missing library {}",
                    registration.role, registration.ordinal, registration.library
                )));
            }

            let mut stage = |entry_point: &str, kind: StageKind| -> u32 {
                let key = StageKey {
                    library: registration.library,
                    entry_point: entry_point.to_string(),
                    kind,
                };
                *stage_lookup.entry(key.clone()).or_insert_with(|| {
                    layout.stages.push(key);
                    (layout.stages.len() - 1) as u32
                })
            };

            let group = match (&registration.shaders, registration.role) {
                (EntryPointShaders::General(name), EntryPointRole::RayGeneration) => LinkedGroup {
                    role: registration.role,
                    ordinal: registration.ordinal,
                    kind: GroupKind::General,
                    general: Some(stage(name, StageKind::RayGeneration)),
                    closest_hit: None,
                    any_hit: None,
                    intersection: None,
                },
                (EntryPointShaders::General(name), EntryPointRole::Miss) => LinkedGroup {
                    role: registration.role,
                    ordinal: registration.ordinal,
                    kind: GroupKind::General,
                    general: Some(stage(name, StageKind::Miss)),
                    closest_hit: None,
                    any_hit: None,
                    intersection: None,
                },
                (EntryPointShaders::HitGroup(shaders), role) if role.is_hit_group() => {
                    let kind = if shaders.is_procedural() {
                        GroupKind::ProceduralHit
                    } else {
                        GroupKind::TrianglesHit
                    };
                    LinkedGroup {
                        role,
                        ordinal: registration.ordinal,
                        kind,
                        general: None,
                        closest_hit: shaders
                            .closest_hit
                            .as_deref()
                            .map(|name| stage(name, StageKind::ClosestHit)),
                        any_hit: shaders
                            .any_hit
                            .as_deref()
                            .map(|name| stage(name, StageKind::AnyHit)),
                        intersection: shaders
                            .intersection
                            .as_deref()
                            .map(|name| stage(name, StageKind::Intersection)),
                    }
                }
                (shaders, role) => {
                    return Err(RtError::CompilationFailed(format!(
                        "{role} entry point {} has mismatched shaders {shaders:?}",
                        registration.ordinal
                    )))
                }
            };
            layout.groups.push(group);
        }

        Ok(layout)
    }

    /// Unique stages, in first-use order.
    #[must_use]
    pub fn stages(&self) -> &[StageKey] {
        &self.stages
    }

    /// Groups, in registration order.
    #[must_use]
    pub fn groups(&self) -> &[LinkedGroup] {
        &self.groups
    }

    /// Group index of every registration.
    #[must_use]
    pub fn group_indices(&self) -> Vec<u32> {
        (0..self.groups.len() as u32).collect()
    }

    /// Vulkan create infos for all groups.
    #[must_use]
    pub fn create_infos(&self) -> Vec<vk::RayTracingShaderGroupCreateInfoKHR<'static>> {
        self.groups.iter().map(LinkedGroup::create_info).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_tracer() -> ProgramDescriptor {
        let mut d = ProgramDescriptor::with_library("PathTracer.rt.hlsl");
        d.add_ray_gen("rayGen").unwrap();
        d.add_miss(0, "scatterMiss").unwrap();
        d.add_miss(1, "shadowMiss").unwrap();
        d.add_hit_group(0, "scatterClosestHit", "scatterAnyHit", "")
            .unwrap();
        d.add_hit_group(1, "", "shadowAnyHit", "").unwrap();
        d.add_curve_hit_group(0, "scatterClosestHit", "", "curveIntersect")
            .unwrap();
        d
    }

    #[test]
    fn groups_follow_registration_order() {
        let layout = ShaderGroupLayout::link(&path_tracer()).unwrap();
        assert_eq!(layout.groups().len(), 6);
        assert_eq!(layout.group_indices(), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(layout.groups()[0].kind, GroupKind::General);
        assert_eq!(layout.groups()[3].kind, GroupKind::TrianglesHit);
        assert_eq!(layout.groups()[5].kind, GroupKind::ProceduralHit);
    }

    #[test]
    fn shared_stages_are_deduplicated() {
        let layout = ShaderGroupLayout::link(&path_tracer()).unwrap();
        // rayGen, scatterMiss, shadowMiss, scatterClosestHit, scatterAnyHit,
        // shadowAnyHit, curveIntersect
        assert_eq!(layout.stages().len(), 7);
        let groups = layout.groups();
        assert_eq!(groups[3].closest_hit, groups[5].closest_hit);
    }

    #[test]
    fn same_symbol_different_stage_is_distinct() {
        let mut d = ProgramDescriptor::with_library("Lib.rt.hlsl");
        d.add_ray_gen("main").unwrap();
        d.add_miss(0, "main").unwrap();
        let layout = ShaderGroupLayout::link(&d).unwrap();
        assert_eq!(layout.stages().len(), 2);
    }

    #[test]
    fn create_info_marks_unused_stages() {
        let layout = ShaderGroupLayout::link(&path_tracer()).unwrap();
        let infos = layout.create_infos();
        let shadow = infos[4];
        assert_eq!(shadow.ty, vk::RayTracingShaderGroupTypeKHR::TRIANGLES_HIT_GROUP);
        assert_eq!(shadow.closest_hit_shader, vk::SHADER_UNUSED_KHR);
        assert_eq!(shadow.general_shader, vk::SHADER_UNUSED_KHR);
        assert_ne!(shadow.any_hit_shader, vk::SHADER_UNUSED_KHR);

        let ray_gen = infos[0];
        assert_eq!(ray_gen.ty, vk::RayTracingShaderGroupTypeKHR::GENERAL);
        assert_eq!(ray_gen.general_shader, 0);
    }
}
