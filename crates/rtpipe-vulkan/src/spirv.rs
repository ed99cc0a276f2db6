//! Compiled SPIR-V programs and a compiler over precompiled modules.

use std::ffi::{CString, OsStr};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hashbrown::HashMap;
use rtpipe_core::{Result, RtError};
use rtpipe_program::{CompiledProgram, ProgramDescriptor, ShaderCompiler};

use crate::link::{ShaderGroupLayout, StageKey, StageKind};

/// SPIR-V magic number (first word of every module).
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// One compiled pipeline stage.
#[derive(Clone, Debug)]
pub struct CompiledStage {
    pub kind: StageKind,
    pub entry_point: CString,
    pub spirv: Arc<Vec<u32>>,
}

/// Program ready for pipeline creation: linked groups plus one SPIR-V module
/// per unique stage.
#[derive(Clone, Debug)]
pub struct VulkanProgram {
    pub layout: ShaderGroupLayout,
    pub stages: Vec<CompiledStage>,
}

impl VulkanProgram {
    /// Pair a linked layout with the SPIR-V for each of its stages.
    pub fn new(layout: ShaderGroupLayout, spirv: Vec<Arc<Vec<u32>>>) -> Result<Self> {
        if spirv.len() != layout.stages().len() {
            return Err(RtError::CompilationFailed(format!(
                "{} SPIR-V modules for {} stages",
                spirv.len(),
                layout.stages().len()
            )));
        }
        let stages = layout
            .stages()
            .iter()
            .zip(spirv)
            .map(|(key, spirv)| {
                let entry_point = CString::new(key.entry_point.as_str()).map_err(|_| {
                    RtError::CompilationFailed(format!(
                        "entry point name {:?} contains a NUL byte",
                        key.entry_point
                    ))
                })?;
                Ok(CompiledStage {
                    kind: key.kind,
                    entry_point,
                    spirv,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { layout, stages })
    }

    /// Compiler output for this program.
    #[must_use]
    pub fn into_compiled(self) -> CompiledProgram<Self> {
        let group_indices = self.layout.group_indices();
        CompiledProgram {
            program: self,
            group_indices,
        }
    }
}

/// Convert a byte slice to SPIR-V words.
pub fn bytes_to_spirv(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return Err(RtError::CompilationFailed(
            "SPIR-V bytecode must be 4-byte aligned".to_string(),
        ));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// File name an intermediate module for `key` is dumped under.
#[must_use]
pub fn intermediate_file_name(library: &Path, key: &StageKey) -> String {
    let stem = library
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("library");
    format!("{stem}.{}.{}.spv", key.entry_point, key.kind.name())
}

/// Write a compiled stage into `dir`, creating it if needed. Returns the file path.
pub fn dump_intermediate(
    dir: &Path,
    library: &Path,
    key: &StageKey,
    spirv: &[u32],
) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(intermediate_file_name(library, key));
    let bytes: Vec<u8> = spirv.iter().flat_map(|word| word.to_le_bytes()).collect();
    fs::write(&path, bytes)?;
    Ok(path)
}

/// Compiler that resolves entry points against precompiled SPIR-V modules.
///
/// Modules are registered per (library path, entry point). Each module must
/// export its entry point under the same symbol.
#[derive(Default)]
pub struct SpirvLibrary {
    modules: HashMap<(PathBuf, String), Arc<Vec<u32>>>,
}

impl SpirvLibrary {
    /// Create an empty library.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the module for `entry_point` of `library`.
    pub fn insert(
        &mut self,
        library: impl Into<PathBuf>,
        entry_point: impl Into<String>,
        spirv: Vec<u32>,
    ) -> Result<&mut Self> {
        let entry_point = entry_point.into();
        if spirv.first() != Some(&SPIRV_MAGIC) {
            return Err(RtError::CompilationFailed(format!(
                "module for {entry_point} is not SPIR-V (bad magic number)"
            )));
        }
        self.modules
            .insert((library.into(), entry_point), Arc::new(spirv));
        Ok(self)
    }

    /// Register a module from raw bytes, e.g. an embedded `.spv` file.
    pub fn insert_bytes(
        &mut self,
        library: impl Into<PathBuf>,
        entry_point: impl Into<String>,
        bytes: &[u8],
    ) -> Result<&mut Self> {
        let words = bytes_to_spirv(bytes)?;
        self.insert(library, entry_point, words)
    }

    /// Number of registered modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether no module is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    fn resolve(&self, desc: &ProgramDescriptor, key: &StageKey) -> Result<Arc<Vec<u32>>> {
        let library = desc.library(key.library).ok_or_else(|| {
            RtError::CompilationFailed(format!("missing shader library {}", key.library))
        })?;
        self.modules
            .get(&(library.to_path_buf(), key.entry_point.clone()))
            .cloned()
            .ok_or_else(|| {
                RtError::CompilationFailed(format!(
                    "unresolved {} entry point '{}' in {}",
                    key.kind.name(),
                    key.entry_point,
                    library.display()
                ))
            })
    }
}

impl ShaderCompiler for SpirvLibrary {
    type Program = VulkanProgram;

    fn compile(&self, desc: &ProgramDescriptor) -> Result<CompiledProgram<VulkanProgram>> {
        let layout = ShaderGroupLayout::link(desc)?;
        let spirv = layout
            .stages()
            .iter()
            .map(|key| self.resolve(desc, key))
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(
            stages = layout.stages().len(),
            groups = layout.groups().len(),
            "Resolved precompiled SPIR-V program"
        );
        Ok(VulkanProgram::new(layout, spirv)?.into_compiled())
    }
}
