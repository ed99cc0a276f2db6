//! Programs compiled from precompiled SPIR-V and linked for Vulkan, built
//! against a backend that inspects the linked layout instead of a device.

use std::sync::Arc;

use rtpipe_program::{
    BackendLimits, PipelineBackend, Result, RtError, RtProgram, StateObjectRequest,
};
use rtpipe_test::{init_tracing, path_tracer_descriptor, TestLayout};
use rtpipe_vulkan::{GroupKind, SpirvLibrary, VulkanProgram, SPIRV_MAGIC};

#[derive(Debug)]
struct LinkSummary {
    stages: usize,
    groups: usize,
    procedural: usize,
}

struct LinkOnlyBackend;

impl PipelineBackend for LinkOnlyBackend {
    type Program = VulkanProgram;
    type Layout = TestLayout;
    type StateObject = LinkSummary;

    fn name(&self) -> &str {
        "link-only"
    }

    fn limits(&self) -> BackendLimits {
        BackendLimits::default()
    }

    fn build_state_object(
        &self,
        request: &StateObjectRequest<'_, VulkanProgram, TestLayout>,
    ) -> Result<LinkSummary> {
        let groups = request.program.layout.groups();
        Ok(LinkSummary {
            stages: request.program.stages.len(),
            groups: groups.len(),
            procedural: groups
                .iter()
                .filter(|g| g.kind == GroupKind::ProceduralHit)
                .count(),
        })
    }
}

fn library(skip: Option<&str>) -> SpirvLibrary {
    let mut lib = SpirvLibrary::new();
    for entry in [
        "rayGen",
        "rayGenReference",
        "scatterMiss",
        "shadowMiss",
        "scatterClosestHit",
        "scatterAnyHit",
        "shadowAnyHit",
        "curveIntersection",
    ] {
        if Some(entry) != skip {
            lib.insert("PathTracer.rt.hlsl", entry, vec![SPIRV_MAGIC, 0x0001_0400, 0, 8, 0])
                .unwrap();
        }
    }
    lib
}

#[test]
fn linked_program_indices_follow_registration_order() {
    init_tracing();
    let program = RtProgram::create(
        &path_tracer_descriptor().unwrap(),
        &library(None),
        Arc::new(LinkOnlyBackend),
    )
    .unwrap();

    assert_eq!(program.ray_gen_index(0).unwrap(), Some(0));
    assert_eq!(program.ray_gen_index(1).unwrap(), Some(1));
    assert_eq!(program.miss_index(1).unwrap(), Some(3));
    assert_eq!(program.hit_index(0).unwrap(), Some(4));
    assert_eq!(program.particle_hit_index(0).unwrap(), Some(6));
    assert_eq!(program.curve_hit_index(0).unwrap(), Some(7));
}

#[test]
fn shared_stages_are_deduplicated() {
    let program = RtProgram::create(
        &path_tracer_descriptor().unwrap(),
        &library(None),
        Arc::new(LinkOnlyBackend),
    )
    .unwrap();

    let summary = program.get_rtso(&TestLayout::new()).unwrap();
    assert_eq!(summary.groups, 8);
    assert_eq!(summary.stages, 8);
    assert_eq!(summary.procedural, 1);
}

#[test]
fn missing_module_fails_creation() {
    let result = RtProgram::create(
        &path_tracer_descriptor().unwrap(),
        &library(Some("curveIntersection")),
        Arc::new(LinkOnlyBackend),
    );
    assert!(
        matches!(result, Err(RtError::CompilationFailed(msg)) if msg.contains("curveIntersection"))
    );
}
