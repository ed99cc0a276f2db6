//! End-to-end behaviour of `RtProgram` against the recording doubles.

use std::collections::HashSet;
use std::sync::Arc;

use rtpipe_program::{
    BackendLimits, GroupInfo, ProgramDescriptor, RtError, RtProgram, Scene, VarsLayout,
};
use rtpipe_test::{
    init_tracing, path_tracer_descriptor, FixedIndexCompiler, RecordingBackend,
    RecordingCompiler, TestLayout, TestScene,
};

fn create(desc: &ProgramDescriptor) -> RtProgram<RecordingBackend> {
    RtProgram::create(desc, &RecordingCompiler::new(), RecordingBackend::new()).unwrap()
}

#[test]
fn counts_match_registrations() {
    init_tracing();
    let program = create(&path_tracer_descriptor().unwrap());

    assert_eq!(program.ray_gen_count(), 2);
    assert_eq!(program.miss_count(), 2);
    assert_eq!(program.hit_count(), 2);
    assert_eq!(program.particle_hit_count(), 1);
    assert_eq!(program.curve_hit_count(), 1);
    assert_eq!(program.max_trace_recursion_depth(), 2);
    assert_eq!(program.max_payload_size(), 128);
    assert_eq!(program.max_attributes_size(), 32);
}

#[test]
fn group_indices_are_the_compiler_assignments() {
    let program = create(&path_tracer_descriptor().unwrap());

    // Registration i gets 100 + (7 - i) * 3.
    assert_eq!(program.ray_gen_index(0).unwrap(), Some(121));
    assert_eq!(program.ray_gen_index(1).unwrap(), Some(118));
    assert_eq!(program.miss_index(0).unwrap(), Some(115));
    assert_eq!(program.miss_index(1).unwrap(), Some(112));
    assert_eq!(program.hit_index(0).unwrap(), Some(109));
    assert_eq!(program.hit_index(1).unwrap(), Some(106));
    assert_eq!(program.particle_hit_index(0).unwrap(), Some(103));
    assert_eq!(program.curve_hit_index(0).unwrap(), Some(100));
}

#[test]
fn group_indices_unique_across_tables() {
    let program = create(&path_tracer_descriptor().unwrap());
    let indices: Vec<u32> = program
        .group_tables()
        .iter()
        .flat_map(|table| table.iter().filter_map(GroupInfo::group_index))
        .collect();
    let unique: HashSet<u32> = indices.iter().copied().collect();
    assert_eq!(indices.len(), 8);
    assert_eq!(unique.len(), indices.len());
}

#[test]
fn lookups_past_count_fail() {
    let program = create(&path_tracer_descriptor().unwrap());

    assert!(matches!(
        program.ray_gen_index(2),
        Err(RtError::IndexOutOfRange {
            index: 2,
            count: 2,
            ..
        })
    ));
    assert!(matches!(
        program.miss_index(5),
        Err(RtError::IndexOutOfRange { .. })
    ));
    assert!(matches!(
        program.curve_hit_index(1),
        Err(RtError::IndexOutOfRange {
            table: "curve hit",
            ..
        })
    ));
}

#[test]
fn sparse_slots_report_unassigned() {
    let mut desc = ProgramDescriptor::with_library("Sparse.rt.hlsl");
    desc.add_ray_gen("rayGen")
        .unwrap()
        .add_hit_group(2, "closestHit", "", "")
        .unwrap();
    let program = create(&desc);

    assert_eq!(program.hit_count(), 3);
    assert_eq!(program.hit_index(0).unwrap(), None);
    assert_eq!(program.hit_index(1).unwrap(), None);
    assert!(program.hit_index(2).unwrap().is_some());
    assert_eq!(program.miss_count(), 0);
}

#[test]
fn alternate_group_from_hit_group_gets_own_index() {
    let program = create(&path_tracer_descriptor().unwrap());
    let hit = program.hit_index(0).unwrap();
    let particle = program.particle_hit_index(0).unwrap();
    assert!(hit.is_some() && particle.is_some());
    assert_ne!(hit, particle);
}

#[test]
fn get_rtso_builds_once_per_key() {
    init_tracing();
    let backend = RecordingBackend::new();
    let program = RtProgram::create(
        &path_tracer_descriptor().unwrap(),
        &RecordingCompiler::new(),
        Arc::clone(&backend),
    )
    .unwrap();
    let layout = TestLayout::new();

    let first = program.get_rtso(&layout).unwrap();
    let second = program.get_rtso(&layout).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(backend.build_count(), 1);
    assert_eq!(program.cached_state_objects(), 1);

    let record = backend.builds()[0];
    assert_eq!(record.scene, None);
    assert_eq!(record.layout, layout.id());
    assert_eq!(record.max_trace_recursion_depth, 2);
    assert_eq!(record.max_payload_size, 128);
    assert_eq!(record.max_attributes_size, 32);
}

#[test]
fn distinct_layouts_get_distinct_state_objects() {
    let backend = RecordingBackend::new();
    let program = RtProgram::create(
        &path_tracer_descriptor().unwrap(),
        &RecordingCompiler::new(),
        Arc::clone(&backend),
    )
    .unwrap();

    let a = program.get_rtso(&TestLayout::new()).unwrap();
    let b = program.get_rtso(&TestLayout::new()).unwrap();

    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(backend.build_count(), 2);
}

#[test]
fn scene_change_rebuilds_and_drops_old_entries() {
    init_tracing();
    let backend = RecordingBackend::new();
    let mut program = RtProgram::create(
        &path_tracer_descriptor().unwrap(),
        &RecordingCompiler::new(),
        Arc::clone(&backend),
    )
    .unwrap();
    let layout = TestLayout::new();

    let scene_a = TestScene::new();
    let scene_b = TestScene::new();

    program.set_scene(Some(scene_a.clone()));
    let on_a = program.get_rtso(&layout).unwrap();
    assert_eq!(on_a.scene, Some(scene_a.id()));

    program.set_scene(Some(scene_b.clone()));
    assert_eq!(program.cached_state_objects(), 0);

    let on_b = program.get_rtso(&layout).unwrap();
    assert_eq!(on_b.scene, Some(scene_b.id()));
    assert!(!Arc::ptr_eq(&on_a, &on_b));
    assert_eq!(backend.build_count(), 2);
    assert_eq!(program.cached_state_objects(), 1);

    // Held handles stay valid after invalidation.
    assert_eq!(on_a.serial, 1);
}

#[test]
fn rebinding_same_scene_keeps_cache() {
    let backend = RecordingBackend::new();
    let mut program = RtProgram::create(
        &path_tracer_descriptor().unwrap(),
        &RecordingCompiler::new(),
        Arc::clone(&backend),
    )
    .unwrap();
    let layout = TestLayout::new();
    let scene = TestScene::new();

    program.set_scene(Some(scene.clone()));
    let first = program.get_rtso(&layout).unwrap();
    program.set_scene(Some(scene));
    let second = program.get_rtso(&layout).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(backend.build_count(), 1);
}

#[test]
fn unbinding_scene_invalidates() {
    let backend = RecordingBackend::new();
    let mut program = RtProgram::create(
        &path_tracer_descriptor().unwrap(),
        &RecordingCompiler::new(),
        Arc::clone(&backend),
    )
    .unwrap();
    let layout = TestLayout::new();

    program.set_scene(Some(TestScene::new()));
    program.get_rtso(&layout).unwrap();
    program.set_scene(None);

    assert!(program.scene().is_none());
    assert_eq!(program.cached_state_objects(), 0);
    assert_eq!(program.get_rtso(&layout).unwrap().scene, None);
}

#[test]
fn depth_above_backend_limit_creates_nothing() {
    let compiler = RecordingCompiler::new();
    let backend = Arc::new(RecordingBackend::with_limits(BackendLimits {
        max_trace_recursion_depth: 1,
        ..BackendLimits::default()
    }));

    let result = RtProgram::create(&path_tracer_descriptor().unwrap(), &compiler, backend);

    assert!(matches!(
        result,
        Err(RtError::ConfigurationLimitExceeded {
            value: 2,
            max: 1,
            ..
        })
    ));
    assert_eq!(compiler.compile_count(), 0);
}

#[test]
fn attributes_above_limit_rejected() {
    let result = RtProgram::create_with_sizes(
        &path_tracer_descriptor().unwrap(),
        &RecordingCompiler::new(),
        RecordingBackend::new(),
        128,
        64,
    );
    assert!(matches!(
        result,
        Err(RtError::ConfigurationLimitExceeded {
            what: "max attributes size",
            ..
        })
    ));
}

#[test]
fn custom_sizes_reach_the_backend() {
    let backend = RecordingBackend::new();
    let program = RtProgram::create_with_sizes(
        &path_tracer_descriptor().unwrap(),
        &RecordingCompiler::new(),
        Arc::clone(&backend),
        256,
        16,
    )
    .unwrap();
    program.get_rtso(&TestLayout::new()).unwrap();

    let record = backend.builds()[0];
    assert_eq!(record.max_payload_size, 256);
    assert_eq!(record.max_attributes_size, 16);
}

#[test]
fn unresolved_entry_point_fails_creation() {
    let compiler = RecordingCompiler::new().with_unresolved("shadowAnyHit");
    let result = RtProgram::create(
        &path_tracer_descriptor().unwrap(),
        &compiler,
        RecordingBackend::new(),
    );
    assert!(matches!(result, Err(RtError::CompilationFailed(msg)) if msg.contains("shadowAnyHit")));
    assert_eq!(compiler.compile_count(), 1);
}

#[test]
fn wrong_number_of_group_indices_fails() {
    let desc = path_tracer_descriptor().unwrap();
    let result = RtProgram::create(
        &desc,
        &FixedIndexCompiler(vec![0, 1, 2]),
        RecordingBackend::new(),
    );
    assert!(matches!(result, Err(RtError::CompilationFailed(_))));
}

#[test]
fn duplicate_group_indices_fail() {
    let desc = path_tracer_descriptor().unwrap();
    let result = RtProgram::create(
        &desc,
        &FixedIndexCompiler(vec![0, 1, 2, 3, 4, 5, 6, 6]),
        RecordingBackend::new(),
    );
    assert!(matches!(result, Err(RtError::CompilationFailed(_))));
}

#[test]
fn program_without_ray_gen_rejected() {
    let mut desc = ProgramDescriptor::with_library("MissOnly.rt.hlsl");
    desc.add_miss(0, "miss").unwrap();
    let result = RtProgram::create(&desc, &RecordingCompiler::new(), RecordingBackend::new());
    assert!(matches!(result, Err(RtError::InvalidConfiguration(_))));
}

#[test]
fn failed_build_leaves_cache_consistent() {
    let backend = RecordingBackend::new();
    let program = RtProgram::create(
        &path_tracer_descriptor().unwrap(),
        &RecordingCompiler::new(),
        Arc::clone(&backend),
    )
    .unwrap();
    let layout = TestLayout::new();

    backend.set_failing(true);
    assert!(matches!(
        program.get_rtso(&layout),
        Err(RtError::BackendBuildFailed(_))
    ));
    assert_eq!(program.cached_state_objects(), 0);

    backend.set_failing(false);
    let rtso = program.get_rtso(&layout).unwrap();
    assert_eq!(rtso.serial, 1);
    assert_eq!(backend.build_count(), 1);
}

#[test]
fn descriptor_is_copied_at_creation() {
    let mut desc = path_tracer_descriptor().unwrap();
    let program = create(&desc);
    desc.add_miss(2, "lateMiss").unwrap();
    desc.set_max_trace_recursion_depth(8);

    assert_eq!(program.miss_count(), 2);
    assert_eq!(program.max_trace_recursion_depth(), 2);
    assert_eq!(program.descriptor().defines().get("MAX_BOUNCES"), Some("3"));
}

#[test]
fn concurrent_get_rtso_builds_once() {
    let backend = RecordingBackend::new();
    let program = RtProgram::create(
        &path_tracer_descriptor().unwrap(),
        &RecordingCompiler::new(),
        Arc::clone(&backend),
    )
    .unwrap();
    let layout = TestLayout::new();

    let handles: Vec<_> = std::thread::scope(|s| {
        let workers: Vec<_> = (0..8)
            .map(|_| s.spawn(|| program.get_rtso(&layout).unwrap()))
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    assert_eq!(backend.build_count(), 1);
    assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
}

#[test]
fn highest_slot_ordinal_creates_bounded_table() {
    use rtpipe_core::constants::MAX_SLOT_ORDINAL;

    let mut desc = ProgramDescriptor::with_library("Far.rt.hlsl");
    desc.add_ray_gen("rayGen")
        .unwrap()
        .add_miss(MAX_SLOT_ORDINAL, "farMiss")
        .unwrap();
    let program = create(&desc);

    assert_eq!(program.miss_count(), MAX_SLOT_ORDINAL + 1);
    assert!(program.miss_index(MAX_SLOT_ORDINAL).unwrap().is_some());
    assert_eq!(program.miss_index(0).unwrap(), None);
    assert!(program.miss_index(MAX_SLOT_ORDINAL + 1).is_err());
}
