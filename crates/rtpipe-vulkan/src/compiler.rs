//! Runtime HLSL compilation through shaderc.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hashbrown::HashMap;
use rtpipe_core::{CompilerFlags, Result, RtError};
use rtpipe_program::{CompiledProgram, ProgramDescriptor, ShaderCompiler};
use shaderc::{
    CompileOptions, Compiler, EnvVersion, IncludeType, OptimizationLevel, ResolvedInclude,
    ShaderKind, SourceLanguage, SpirvVersion, TargetEnv,
};

use crate::link::{ShaderGroupLayout, StageKind};
use crate::spirv::{dump_intermediate, VulkanProgram};

impl StageKind {
    const fn shader_kind(self) -> ShaderKind {
        match self {
            Self::RayGeneration => ShaderKind::RayGeneration,
            Self::Miss => ShaderKind::Miss,
            Self::ClosestHit => ShaderKind::ClosestHit,
            Self::AnyHit => ShaderKind::AnyHit,
            Self::Intersection => ShaderKind::Intersection,
        }
    }
}

/// [`ShaderCompiler`] that compiles each stage from HLSL shader libraries.
///
/// Library paths are resolved against the search directories in order, then
/// as given. With [`CompilerFlags::DUMP_INTERMEDIATES`] every compiled stage is
/// also written to the dump directory (`$TMPDIR/rtpipe` unless set).
///
/// shaderc has no floating-point strictness control, so the
/// `FLOATING_POINT_MODE_*` flags are accepted but have no effect.
pub struct HlslCompiler {
    compiler: Compiler,
    search_dirs: Vec<PathBuf>,
    dump_dir: Option<PathBuf>,
}

impl HlslCompiler {
    /// Create a compiler.
    pub fn new() -> Result<Self> {
        let compiler = Compiler::new().ok_or_else(|| {
            RtError::CompilationFailed("Failed to create shader compiler".to_string())
        })?;
        Ok(Self {
            compiler,
            search_dirs: Vec::new(),
            dump_dir: None,
        })
    }

    /// Directory intermediate SPIR-V is dumped into.
    #[must_use]
    pub fn with_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_dir = Some(dir.into());
        self
    }

    fn dump_dir(&self) -> PathBuf {
        self.dump_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("rtpipe"))
    }

    /// Add a directory used to resolve libraries and `#include`s.
    #[must_use]
    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dirs.push(dir.into());
        self
    }

    fn resolve_path(&self, path: &Path) -> Option<PathBuf> {
        self.search_dirs
            .iter()
            .map(|dir| dir.join(path))
            .chain(std::iter::once(path.to_path_buf()))
            .find(|candidate| candidate.is_file())
    }

    fn options(&self, desc: &ProgramDescriptor) -> Result<CompileOptions<'_>> {
        let mut options = CompileOptions::new().ok_or_else(|| {
            RtError::CompilationFailed("Failed to create compile options".to_string())
        })?;
        options.set_source_language(SourceLanguage::HLSL);
        options.set_target_env(TargetEnv::Vulkan, EnvVersion::Vulkan1_2 as u32);
        options.set_target_spirv(SpirvVersion::V1_4);

        for (name, value) in desc.defines().iter() {
            options.add_macro_definition(name, Some(value));
        }

        let flags = desc.compiler_flags();
        if flags.contains(CompilerFlags::TREAT_WARNINGS_AS_ERRORS) {
            options.set_warnings_as_errors();
        }
        if flags.contains(CompilerFlags::GENERATE_DEBUG_INFO) {
            options.set_generate_debug_info();
            options.set_optimization_level(OptimizationLevel::Zero);
        } else {
            options.set_optimization_level(OptimizationLevel::Performance);
        }
        let fp_modes =
            flags & (CompilerFlags::FLOATING_POINT_MODE_FAST | CompilerFlags::FLOATING_POINT_MODE_PRECISE);
        if !fp_modes.is_empty() {
            tracing::debug!(flags = ?fp_modes, "Floating-point mode flags ignored by shaderc");
        }

        let search_dirs = self.search_dirs.clone();
        options.set_include_callback(move |requested, include_type, requesting, _depth| {
            let relative_base = Path::new(requesting)
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default();
            let candidates = match include_type {
                IncludeType::Relative => std::iter::once(relative_base.join(requested))
                    .chain(search_dirs.iter().map(|dir| dir.join(requested)))
                    .collect::<Vec<_>>(),
                IncludeType::Standard => search_dirs.iter().map(|dir| dir.join(requested)).collect(),
            };
            candidates
                .into_iter()
                .find(|candidate| candidate.is_file())
                .ok_or_else(|| format!("cannot find include '{requested}'"))
                .and_then(|path| {
                    fs::read_to_string(&path)
                        .map(|content| ResolvedInclude {
                            resolved_name: path.display().to_string(),
                            content,
                        })
                        .map_err(|e| format!("{}: {e}", path.display()))
                })
        });

        Ok(options)
    }
}

impl ShaderCompiler for HlslCompiler {
    type Program = VulkanProgram;

    fn compile(&self, desc: &ProgramDescriptor) -> Result<CompiledProgram<VulkanProgram>> {
        let layout = ShaderGroupLayout::link(desc)?;
        let options = self.options(desc)?;
        let mut sources: HashMap<usize, (PathBuf, String)> = HashMap::new();
        let mut spirv = Vec::with_capacity(layout.stages().len());
        let dump_dir = desc
            .compiler_flags()
            .contains(CompilerFlags::DUMP_INTERMEDIATES)
            .then(|| self.dump_dir());

        for stage in layout.stages() {
            if !sources.contains_key(&stage.library) {
                let library = desc.library(stage.library).ok_or_else(|| {
                    RtError::CompilationFailed(format!("missing shader library {}", stage.library))
                })?;
                let path = self.resolve_path(library).ok_or_else(|| {
                    RtError::CompilationFailed(format!(
                        "shader library not found: {}",
                        library.display()
                    ))
                })?;
                let source = fs::read_to_string(&path)?;
                sources.insert(stage.library, (path, source));
            }
            let (path, source) = &sources[&stage.library];

            let artifact = self
                .compiler
                .compile_into_spirv(
                    source,
                    stage.kind.shader_kind(),
                    &path.display().to_string(),
                    &stage.entry_point,
                    Some(&options),
                )
                .map_err(|e| {
                    RtError::CompilationFailed(format!(
                        "{} '{}' in {}: {e}",
                        stage.kind.name(),
                        stage.entry_point,
                        path.display()
                    ))
                })?;

            if artifact.get_num_warnings() > 0 {
                tracing::warn!(
                    entry_point = %stage.entry_point,
                    "{}",
                    artifact.get_warning_messages()
                );
            }
            let words = artifact.as_binary().to_vec();
            if let Some(dir) = &dump_dir {
                let file = dump_intermediate(dir, path, stage, &words)?;
                tracing::debug!(path = %file.display(), "Dumped intermediate SPIR-V");
            }
            spirv.push(Arc::new(words));
        }

        tracing::info!(
            libraries = sources.len(),
            stages = spirv.len(),
            groups = layout.groups().len(),
            "Compiled HLSL ray tracing program"
        );

        Ok(VulkanProgram::new(layout, spirv)?.into_compiled())
    }
}
