//! Collaborator interfaces: shader compiler, scene, variable layout and
//! pipeline backend.
//!
//! Each GPU API provides one [`ShaderCompiler`] and one [`PipelineBackend`]
//! implementation. The program model never talks to a GPU directly.

use rtpipe_core::constants::{API_MAX_TRACE_RECURSION_DEPTH, DEFAULT_MAX_ATTRIBUTES_SIZE};
use rtpipe_core::{GeometryTypes, LayoutId, Result, SceneId};

use crate::descriptor::ProgramDescriptor;
use crate::groups::GroupTables;

/// Scene a program dispatches against.
pub trait Scene: Send + Sync {
    /// Identity used as part of the state object cache key.
    fn id(&self) -> SceneId;

    /// Geometry types present in the scene.
    fn geometry_types(&self) -> GeometryTypes {
        GeometryTypes::TRIANGLES
    }
}

/// Resource binding layout supplied by the caller at dispatch time.
pub trait VarsLayout: Send + Sync {
    /// Identity used as part of the state object cache key.
    fn id(&self) -> LayoutId;
}

/// Hard limits of a ray tracing backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackendLimits {
    /// Maximum declarable trace recursion depth.
    pub max_trace_recursion_depth: u32,
    /// Maximum ray payload size in bytes, if the API bounds it.
    pub max_payload_size: Option<u32>,
    /// Maximum hit attribute size in bytes.
    pub max_attributes_size: u32,
}

impl Default for BackendLimits {
    fn default() -> Self {
        Self {
            max_trace_recursion_depth: API_MAX_TRACE_RECURSION_DEPTH,
            max_payload_size: None,
            max_attributes_size: DEFAULT_MAX_ATTRIBUTES_SIZE,
        }
    }
}

/// Output of a [`ShaderCompiler`].
#[derive(Clone, Debug)]
pub struct CompiledProgram<P> {
    /// Backend program object.
    pub program: P,
    /// Group index of every registration, in registration order.
    pub group_indices: Vec<u32>,
}

/// Compiles and links a [`ProgramDescriptor`].
pub trait ShaderCompiler {
    /// Backend program produced by the compiler.
    type Program: Send + Sync;

    /// Compile every entry point of `desc` and assign a group index to each
    /// registration. Fails with `CompilationFailed` on an unresolved symbol or
    /// a shader error.
    fn compile(&self, desc: &ProgramDescriptor) -> Result<CompiledProgram<Self::Program>>;
}

/// Everything a backend needs to build a pipeline state object.
pub struct StateObjectRequest<'a, P, L> {
    /// Compiled program the pipeline is built from.
    pub program: &'a P,
    /// Group index tables, for laying out the shader binding table.
    pub groups: &'a GroupTables,
    /// Bound scene, if any. Its geometry types pick the hit groups to include.
    pub scene: Option<&'a dyn Scene>,
    /// Program variable layout the pipeline is specialised for.
    pub layout: &'a L,
    /// Deepest `TraceRay` nesting the pipeline must support.
    pub max_trace_recursion_depth: u32,
    /// Max ray payload size in bytes.
    pub max_payload_size: u32,
    /// Max hit attribute size in bytes.
    pub max_attributes_size: u32,
}

/// Builds pipeline state objects for one GPU API.
pub trait PipelineBackend: Send + Sync {
    /// Compiled program type consumed by the backend.
    type Program: Send + Sync;
    /// Variable layout type supplied at dispatch.
    type Layout: VarsLayout;
    /// Pipeline state object type.
    type StateObject: Send + Sync;

    /// Short backend name, for logging.
    fn name(&self) -> &str;

    /// Limits programs are validated against at creation.
    fn limits(&self) -> BackendLimits;

    /// Build a state object. Fails with `ConfigurationLimitExceeded` or
    /// `BackendBuildFailed`.
    fn build_state_object(
        &self,
        request: &StateObjectRequest<'_, Self::Program, Self::Layout>,
    ) -> Result<Self::StateObject>;
}
