//! Ray tracing program model.
//!
//! This crate provides:
//! - [`ProgramDescriptor`]: builder for entry points, hit groups, defines and limits
//! - [`GroupTables`]: per-role tables of compiler-assigned group indices
//! - [`RtProgram`]: compiled program with a lazily built state object per
//!   (scene, variable layout)
//! - [`StateObjectCache`]: the keyed cache behind [`RtProgram::get_rtso`]
//! - Collaborator traits implemented by GPU backends
//!
//! # Example
//!
//! ```ignore
//! use rtpipe_program::{ProgramDescriptor, RtProgram};
//!
//! let mut desc = ProgramDescriptor::with_library("PathTracer.rt.hlsl");
//! desc.add_ray_gen("rayGen")?
//!     .add_miss(0, "scatterMiss")?
//!     .add_hit_group(0, "scatterClosestHit", "scatterAnyHit", "")?
//!     .add_curve_hit_group_from_hit_group(0)?;
//! desc.set_max_trace_recursion_depth(2);
//!
//! let mut program = RtProgram::create(&desc, &compiler, backend)?;
//! program.set_scene(Some(scene));
//! let rtso = program.get_rtso(&vars_layout)?;
//! ```

pub mod backend;
pub mod cache;
pub mod descriptor;
pub mod groups;
pub mod program;

pub use backend::{
    BackendLimits, CompiledProgram, PipelineBackend, Scene, ShaderCompiler, StateObjectRequest,
    VarsLayout,
};
pub use cache::{StateObjectCache, StateObjectKey};
pub use descriptor::{
    AltGeometry, EntryPointRegistration, EntryPointRole, EntryPointShaders, HitGroupShaders,
    ProgramDescriptor,
};
pub use groups::{EntryPointGroupIndex, GroupInfo, GroupTables};
pub use program::{validate, RtProgram};

pub use rtpipe_core::{
    CompilerFlags, DefineList, GeometryTypes, LayoutId, Result, RtError, SceneId,
};
