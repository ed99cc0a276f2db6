//! Vulkan backend for rtpipe.
//!
//! This crate implements the program model's collaborators with
//! `VK_KHR_ray_tracing_pipeline`:
//! - [`ShaderGroupLayout`]: links a descriptor into stage and group arrays
//! - [`SpirvLibrary`]: compiler over precompiled SPIR-V modules
//! - [`HlslCompiler`]: runtime HLSL compilation (requires `hlsl`)
//! - [`VulkanBackend`]: builds ray tracing pipelines
//!
//! # Feature Flags
//!
//! - `hlsl` - Enable runtime HLSL compilation through shaderc
//!
//! # Example
//!
//! ```ignore
//! use rtpipe_program::RtProgram;
//! use rtpipe_vulkan::{SpirvLibrary, VulkanBackend, VulkanVarsLayout};
//!
//! let backend = Arc::new(unsafe { VulkanBackend::new(&instance, physical_device, device) });
//! let program = RtProgram::create(&desc, &spirv_library, backend)?;
//! let rtso = program.get_rtso(&VulkanVarsLayout::new(pipeline_layout))?;
//! ```

pub mod backend;
#[cfg(feature = "hlsl")]
pub mod compiler;
pub mod limits;
pub mod link;
pub mod spirv;

pub use backend::{VulkanBackend, VulkanStateObject, VulkanVarsLayout};
#[cfg(feature = "hlsl")]
pub use compiler::HlslCompiler;
pub use limits::{RayTracingLimits, REQUIRED_EXTENSIONS};
pub use link::{GroupKind, LinkedGroup, ShaderGroupLayout, StageKey, StageKind};
pub use spirv::{bytes_to_spirv, CompiledStage, SpirvLibrary, VulkanProgram, SPIRV_MAGIC};

/// Check if runtime HLSL compilation is available.
#[must_use]
pub fn has_hlsl_compiler() -> bool {
    cfg!(feature = "hlsl")
}
