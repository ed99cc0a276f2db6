//! TOML program manifests.
//!
//! A manifest lists shader libraries and the entry points each one
//! provides. Entry points bind to the library block they appear in.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use rtpipe_core::constants::DEFAULT_MAX_TRACE_RECURSION_DEPTH;
use rtpipe_core::{CompilerFlags, DefineList};
use rtpipe_program::ProgramDescriptor;
use serde::Deserialize;

/// Root of a manifest file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default = "default_depth")]
    pub max_trace_recursion_depth: u32,
    #[serde(default)]
    pub compiler_flags: CompilerFlags,
    #[serde(default)]
    pub defines: DefineList,
    #[serde(default, rename = "library")]
    pub libraries: Vec<LibraryManifest>,
}

const fn default_depth() -> u32 {
    DEFAULT_MAX_TRACE_RECURSION_DEPTH
}

/// Entry points provided by one shader library.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LibraryManifest {
    pub path: PathBuf,
    #[serde(default)]
    pub ray_gen: Vec<String>,
    #[serde(default)]
    pub miss: Vec<MissEntry>,
    #[serde(default)]
    pub hit: Vec<HitEntry>,
    #[serde(default)]
    pub particle_hit: Vec<HitEntry>,
    #[serde(default)]
    pub curve_hit: Vec<HitEntry>,
    /// Hit slots to duplicate as particle hit groups.
    #[serde(default)]
    pub particle_from_hit: Vec<u32>,
    /// Hit slots to duplicate as curve hit groups.
    #[serde(default)]
    pub curve_from_hit: Vec<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MissEntry {
    pub index: u32,
    pub entry: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HitEntry {
    pub index: u32,
    #[serde(default)]
    pub closest_hit: String,
    #[serde(default)]
    pub any_hit: String,
    #[serde(default)]
    pub intersection: String,
}

impl Manifest {
    /// Read and parse a manifest file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid manifest {}", path.display()))
    }

    /// Parse manifest text.
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Build the program descriptor the manifest describes.
    pub fn to_descriptor(&self) -> rtpipe_core::Result<ProgramDescriptor> {
        let mut desc = ProgramDescriptor::new();

        for library in &self.libraries {
            desc.add_shader_library(&library.path);
            for ray_gen in &library.ray_gen {
                desc.add_ray_gen(ray_gen)?;
            }
            for miss in &library.miss {
                desc.add_miss(miss.index, &miss.entry)?;
            }
            for hit in &library.hit {
                desc.add_hit_group(hit.index, &hit.closest_hit, &hit.any_hit, &hit.intersection)?;
            }
            for hit in &library.particle_hit {
                desc.add_particle_hit_group(
                    hit.index,
                    &hit.closest_hit,
                    &hit.any_hit,
                    &hit.intersection,
                )?;
            }
            for hit in &library.curve_hit {
                desc.add_curve_hit_group(
                    hit.index,
                    &hit.closest_hit,
                    &hit.any_hit,
                    &hit.intersection,
                )?;
            }
            for &index in &library.particle_from_hit {
                desc.add_particle_hit_group_from_hit_group(index)?;
            }
            for &index in &library.curve_from_hit {
                desc.add_curve_hit_group_from_hit_group(index)?;
            }
        }

        desc.add_defines(&self.defines)
            .set_compiler_flags(self.compiler_flags)
            .set_max_trace_recursion_depth(self.max_trace_recursion_depth);
        Ok(desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtpipe_program::{EntryPointRole, RtError};

    const PATH_TRACER: &str = include_str!("../manifests/path_tracer.toml");

    #[test]
    fn bundled_manifest_parses() {
        let manifest = Manifest::parse(PATH_TRACER).unwrap();
        assert_eq!(manifest.libraries.len(), 2);
        assert_eq!(manifest.max_trace_recursion_depth, 2);
        assert_eq!(
            manifest.compiler_flags,
            CompilerFlags::TREAT_WARNINGS_AS_ERRORS
        );
        assert_eq!(manifest.defines.get("MAX_BOUNCES"), Some("3"));
    }

    #[test]
    fn bundled_manifest_builds_descriptor() {
        let desc = Manifest::parse(PATH_TRACER).unwrap().to_descriptor().unwrap();
        assert_eq!(desc.slot_count(EntryPointRole::RayGeneration), 1);
        assert_eq!(desc.slot_count(EntryPointRole::Miss), 2);
        assert_eq!(desc.slot_count(EntryPointRole::HitGroup), 2);
        assert_eq!(desc.registrations().len(), 7);
        assert_eq!(desc.max_trace_recursion_depth(), 2);
        assert_eq!(desc.defines().len(), 2);

        let curve = desc
            .find(EntryPointRole::HitGroupAlt(rtpipe_program::AltGeometry::Curve), 0)
            .unwrap();
        assert_eq!(desc.library(curve.library), Some(Path::new("Curves.rt.hlsl")));
    }

    #[test]
    fn defaults_apply() {
        let manifest = Manifest::parse(
            r#"
            [[library]]
            path = "Minimal.rt.hlsl"
            ray_gen = ["main"]
            "#,
        )
        .unwrap();
        assert_eq!(manifest.max_trace_recursion_depth, 1);
        assert!(manifest.compiler_flags.is_empty());
        assert!(manifest.defines.is_empty());
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(Manifest::parse("max_depth = 3").is_err());
    }

    #[test]
    fn oversized_slot_index_rejected() {
        let manifest = Manifest::parse(
            r#"
            [[library]]
            path = "Huge.rt.hlsl"
            ray_gen = ["main"]
            miss = [{ index = 4294967295, entry = "miss" }]
            "#,
        )
        .unwrap();
        assert!(matches!(
            manifest.to_descriptor(),
            Err(RtError::ConfigurationLimitExceeded { .. })
        ));
    }

    #[test]
    fn empty_hit_group_surfaces_descriptor_error() {
        let manifest = Manifest::parse(
            r#"
            [[library]]
            path = "Broken.rt.hlsl"
            ray_gen = ["main"]
            hit = [{ index = 0 }]
            "#,
        )
        .unwrap();
        assert!(matches!(
            manifest.to_descriptor(),
            Err(RtError::InvalidConfiguration(_))
        ));
    }
}
