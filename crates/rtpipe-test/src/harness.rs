//! Recording collaborators for exercising the program model without a GPU.
//!
//! The compiler hands out deliberately non-sequential group indices so tests
//! cannot depend on indices matching registration order. The backend records
//! every build request.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rtpipe_core::{DefineList, GeometryTypes, LayoutId, Result, RtError, SceneId};
use rtpipe_program::{
    BackendLimits, CompiledProgram, EntryPointShaders, PipelineBackend, ProgramDescriptor, Scene,
    ShaderCompiler, StateObjectRequest, VarsLayout,
};

/// Program produced by [`RecordingCompiler`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestProgram {
    pub entry_points: usize,
    pub defines: DefineList,
}

/// Compiler double assigning `base + (n - 1 - i) * stride` to registration `i`.
pub struct RecordingCompiler {
    base: u32,
    stride: u32,
    unresolved: Vec<String>,
    compiles: AtomicUsize,
}

impl Default for RecordingCompiler {
    fn default() -> Self {
        Self {
            base: 100,
            stride: 3,
            unresolved: Vec::new(),
            compiles: AtomicUsize::new(0),
        }
    }
}

impl RecordingCompiler {
    /// Create a compiler that resolves every entry point.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `entry_point` unresolvable.
    #[must_use]
    pub fn with_unresolved(mut self, entry_point: impl Into<String>) -> Self {
        self.unresolved.push(entry_point.into());
        self
    }

    /// Number of `compile` calls so far.
    #[must_use]
    pub fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }

    fn names(shaders: &EntryPointShaders) -> Vec<&str> {
        match shaders {
            EntryPointShaders::General(name) => vec![name.as_str()],
            EntryPointShaders::HitGroup(hg) => [&hg.closest_hit, &hg.any_hit, &hg.intersection]
                .into_iter()
                .filter_map(|name| name.as_deref())
                .collect(),
        }
    }
}

impl ShaderCompiler for RecordingCompiler {
    type Program = TestProgram;

    fn compile(&self, desc: &ProgramDescriptor) -> Result<CompiledProgram<TestProgram>> {
        self.compiles.fetch_add(1, Ordering::SeqCst);

        for registration in desc.registrations() {
            for name in Self::names(&registration.shaders) {
                if self.unresolved.iter().any(|u| u == name) {
                    return Err(RtError::CompilationFailed(format!(
                        "unresolved entry point '{name}'"
                    )));
                }
            }
        }

        let count = desc.registrations().len() as u32;
        let group_indices = (0..count)
            .map(|i| self.base + (count - 1 - i) * self.stride)
            .collect();

        Ok(CompiledProgram {
            program: TestProgram {
                entry_points: desc.registrations().len(),
                defines: desc.defines().clone(),
            },
            group_indices,
        })
    }
}

/// Compiler double that returns a fixed set of group indices.
pub struct FixedIndexCompiler(pub Vec<u32>);

impl ShaderCompiler for FixedIndexCompiler {
    type Program = TestProgram;

    fn compile(&self, desc: &ProgramDescriptor) -> Result<CompiledProgram<TestProgram>> {
        Ok(CompiledProgram {
            program: TestProgram {
                entry_points: desc.registrations().len(),
                defines: desc.defines().clone(),
            },
            group_indices: self.0.clone(),
        })
    }
}

/// One recorded backend build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuildRecord {
    pub scene: Option<SceneId>,
    pub layout: LayoutId,
    pub max_trace_recursion_depth: u32,
    pub max_payload_size: u32,
    pub max_attributes_size: u32,
}

/// State object produced by [`RecordingBackend`].
#[derive(Debug, PartialEq, Eq)]
pub struct TestStateObject {
    /// Build number, starting at 1.
    pub serial: u64,
    pub scene: Option<SceneId>,
    pub layout: LayoutId,
}

/// Backend double that records builds.
pub struct RecordingBackend {
    limits: BackendLimits,
    builds: Mutex<Vec<BuildRecord>>,
    next_serial: AtomicU64,
    fail_builds: AtomicBool,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::with_limits(BackendLimits::default())
    }
}

impl RecordingBackend {
    /// Backend with default limits.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Backend with the given limits.
    #[must_use]
    pub fn with_limits(limits: BackendLimits) -> Self {
        Self {
            limits,
            builds: Mutex::new(Vec::new()),
            next_serial: AtomicU64::new(1),
            fail_builds: AtomicBool::new(false),
        }
    }

    /// Make subsequent builds fail with `BackendBuildFailed`.
    pub fn set_failing(&self, fail: bool) {
        self.fail_builds.store(fail, Ordering::SeqCst);
    }

    /// Number of successful builds.
    #[must_use]
    pub fn build_count(&self) -> usize {
        self.builds.lock().len()
    }

    /// Successful builds in order.
    #[must_use]
    pub fn builds(&self) -> Vec<BuildRecord> {
        self.builds.lock().clone()
    }
}

impl PipelineBackend for RecordingBackend {
    type Program = TestProgram;
    type Layout = TestLayout;
    type StateObject = TestStateObject;

    fn name(&self) -> &str {
        "recording"
    }

    fn limits(&self) -> BackendLimits {
        self.limits
    }

    fn build_state_object(
        &self,
        request: &StateObjectRequest<'_, TestProgram, TestLayout>,
    ) -> Result<TestStateObject> {
        if self.fail_builds.load(Ordering::SeqCst) {
            return Err(RtError::BackendBuildFailed("injected failure".to_string()));
        }

        let scene = request.scene.map(|s| s.id());
        let layout = request.layout.id();
        self.builds.lock().push(BuildRecord {
            scene,
            layout,
            max_trace_recursion_depth: request.max_trace_recursion_depth,
            max_payload_size: request.max_payload_size,
            max_attributes_size: request.max_attributes_size,
        });

        let serial = self.next_serial.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(serial, "Recorded state object build");

        Ok(TestStateObject {
            serial,
            scene,
            layout,
        })
    }
}

/// Scene double.
#[derive(Debug)]
pub struct TestScene {
    id: SceneId,
    geometry: GeometryTypes,
}

impl TestScene {
    /// Triangle-only scene with a fresh identity.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_geometry(GeometryTypes::TRIANGLES)
    }

    /// Scene with the given geometry types.
    #[must_use]
    pub fn with_geometry(geometry: GeometryTypes) -> Arc<Self> {
        Arc::new(Self {
            id: SceneId::new(),
            geometry,
        })
    }
}

impl Scene for TestScene {
    fn id(&self) -> SceneId {
        self.id
    }

    fn geometry_types(&self) -> GeometryTypes {
        self.geometry
    }
}

/// Variable layout double.
#[derive(Debug)]
pub struct TestLayout {
    id: LayoutId,
}

impl TestLayout {
    /// Layout with a fresh identity.
    #[must_use]
    pub fn new() -> Self {
        Self { id: LayoutId::new() }
    }
}

impl Default for TestLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl VarsLayout for TestLayout {
    fn id(&self) -> LayoutId {
        self.id
    }
}

/// A path tracer style description: two ray-gens, two miss shaders, two hit
/// groups and alternate-geometry variants of the first hit group.
pub fn path_tracer_descriptor() -> Result<ProgramDescriptor> {
    let mut desc = ProgramDescriptor::with_library("PathTracer.rt.hlsl");
    desc.add_ray_gen("rayGen")?
        .add_ray_gen("rayGenReference")?
        .add_miss(0, "scatterMiss")?
        .add_miss(1, "shadowMiss")?
        .add_hit_group(0, "scatterClosestHit", "scatterAnyHit", "")?
        .add_hit_group(1, "", "shadowAnyHit", "")?
        .add_particle_hit_group_from_hit_group(0)?
        .add_curve_hit_group(0, "scatterClosestHit", "", "curveIntersection")?;
    desc.add_define("MAX_BOUNCES", "3")
        .set_max_trace_recursion_depth(2);
    Ok(desc)
}
