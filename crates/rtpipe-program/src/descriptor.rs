//! Ray tracing program descriptions.
//!
//! A [`ProgramDescriptor`] accumulates shader libraries, entry points, defines
//! and compiler settings. It performs no I/O; every check here is local to
//! the description itself. Limits that depend on the backend are checked when
//! the program is created.

use std::fmt;
use std::path::{Path, PathBuf};

use rtpipe_core::constants::{DEFAULT_MAX_TRACE_RECURSION_DEPTH, MAX_SLOT_ORDINAL};
use rtpipe_core::{CompilerFlags, DefineList, Result, RtError};

/// Alternate geometry types that get their own hit-group table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AltGeometry {
    /// Particle / procedural sprite geometry.
    Particle,
    /// Curve (hair, fur) geometry.
    Curve,
}

/// Role an entry point plays in the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryPointRole {
    /// Ray-generation shader, slotted in registration order.
    RayGeneration,
    /// Miss shader at an explicit ordinal.
    Miss,
    /// Standard triangle or procedural hit group at an explicit ordinal.
    HitGroup,
    /// Hit group for an alternative geometry type.
    HitGroupAlt(AltGeometry),
}

impl EntryPointRole {
    /// All roles, in table order.
    pub const ALL: [Self; 5] = [
        Self::RayGeneration,
        Self::Miss,
        Self::HitGroup,
        Self::HitGroupAlt(AltGeometry::Particle),
        Self::HitGroupAlt(AltGeometry::Curve),
    ];

    /// Name of the group table this role is recorded in.
    #[must_use]
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::RayGeneration => "ray-gen",
            Self::Miss => "miss",
            Self::HitGroup => "hit",
            Self::HitGroupAlt(AltGeometry::Particle) => "particle hit",
            Self::HitGroupAlt(AltGeometry::Curve) => "curve hit",
        }
    }

    /// Whether the role is a hit group of any kind.
    #[must_use]
    pub const fn is_hit_group(self) -> bool {
        matches!(self, Self::HitGroup | Self::HitGroupAlt(_))
    }
}

impl fmt::Display for EntryPointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Shaders making up a hit group. Absent shaders are `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct HitGroupShaders {
    pub closest_hit: Option<String>,
    pub any_hit: Option<String>,
    pub intersection: Option<String>,
}

impl HitGroupShaders {
    /// Build from raw names, treating empty strings as absent.
    #[must_use]
    pub fn new(closest_hit: &str, any_hit: &str, intersection: &str) -> Self {
        let name = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Self {
            closest_hit: name(closest_hit),
            any_hit: name(any_hit),
            intersection: name(intersection),
        }
    }

    /// True when no shader is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.closest_hit.is_none() && self.any_hit.is_none() && self.intersection.is_none()
    }

    /// True for procedural (custom intersection) hit groups.
    #[must_use]
    pub const fn is_procedural(&self) -> bool {
        self.intersection.is_some()
    }
}

/// Shader names referenced by a registration.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EntryPointShaders {
    /// A single ray-generation or miss entry point.
    General(String),
    /// A hit group.
    HitGroup(HitGroupShaders),
}

/// One registered entry point or hit group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryPointRegistration {
    /// Role of the registration.
    pub role: EntryPointRole,
    /// Slot the caller registered the entry point at.
    pub ordinal: u32,
    /// Index into [`ProgramDescriptor::libraries`].
    pub library: usize,
    /// Shader names.
    pub shaders: EntryPointShaders,
}

/// Builder for a ray tracing program.
///
/// Every `add_*` call registers exactly one entry point or hit group and
/// returns the descriptor for chaining. A call that fails leaves the
/// descriptor untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgramDescriptor {
    libraries: Vec<PathBuf>,
    registrations: Vec<EntryPointRegistration>,
    defines: DefineList,
    compiler_flags: CompilerFlags,
    max_trace_recursion_depth: u32,
}

impl Default for ProgramDescriptor {
    fn default() -> Self {
        Self {
            libraries: Vec::new(),
            registrations: Vec::new(),
            defines: DefineList::new(),
            compiler_flags: CompilerFlags::empty(),
            max_trace_recursion_depth: DEFAULT_MAX_TRACE_RECURSION_DEPTH,
        }
    }
}

impl ProgramDescriptor {
    /// Create an empty descriptor with no shader library.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a descriptor whose entry points come from `library`.
    #[must_use]
    pub fn with_library(library: impl Into<PathBuf>) -> Self {
        let mut desc = Self::new();
        desc.add_shader_library(library);
        desc
    }

    /// Add a shader library. Entry points registered afterwards resolve against it.
    pub fn add_shader_library(&mut self, library: impl Into<PathBuf>) -> &mut Self {
        self.libraries.push(library.into());
        self
    }

    /// Replace all ray-generation entry points with `ray_gen`.
    pub fn set_ray_gen(&mut self, ray_gen: &str) -> Result<&mut Self> {
        let library = self.current_library()?;
        let name = Self::general_name(EntryPointRole::RayGeneration, ray_gen)?;
        self.registrations
            .retain(|r| r.role != EntryPointRole::RayGeneration);
        self.registrations.push(EntryPointRegistration {
            role: EntryPointRole::RayGeneration,
            ordinal: 0,
            library,
            shaders: EntryPointShaders::General(name),
        });
        Ok(self)
    }

    /// Append a ray-generation entry point.
    pub fn add_ray_gen(&mut self, ray_gen: &str) -> Result<&mut Self> {
        let library = self.current_library()?;
        let name = Self::general_name(EntryPointRole::RayGeneration, ray_gen)?;
        let ordinal = self.slot_count(EntryPointRole::RayGeneration);
        self.registrations.push(EntryPointRegistration {
            role: EntryPointRole::RayGeneration,
            ordinal,
            library,
            shaders: EntryPointShaders::General(name),
        });
        Ok(self)
    }

    /// Register a miss shader at miss slot `miss_index`.
    ///
    /// Slots above [`MAX_SLOT_ORDINAL`] fail with
    /// [`RtError::ConfigurationLimitExceeded`].
    pub fn add_miss(&mut self, miss_index: u32, miss: &str) -> Result<&mut Self> {
        let library = self.current_library()?;
        let name = Self::general_name(EntryPointRole::Miss, miss)?;
        self.ensure_slot_free(EntryPointRole::Miss, miss_index)?;
        self.registrations.push(EntryPointRegistration {
            role: EntryPointRole::Miss,
            ordinal: miss_index,
            library,
            shaders: EntryPointShaders::General(name),
        });
        Ok(self)
    }

    /// Register a hit group at hit slot `hit_index`. Empty names mean "absent".
    pub fn add_hit_group(
        &mut self,
        hit_index: u32,
        closest_hit: &str,
        any_hit: &str,
        intersection: &str,
    ) -> Result<&mut Self> {
        let shaders = HitGroupShaders::new(closest_hit, any_hit, intersection);
        self.push_hit_group(EntryPointRole::HitGroup, hit_index, shaders)
    }

    /// Register a particle hit group at `hit_index`.
    pub fn add_particle_hit_group(
        &mut self,
        hit_index: u32,
        closest_hit: &str,
        any_hit: &str,
        intersection: &str,
    ) -> Result<&mut Self> {
        let shaders = HitGroupShaders::new(closest_hit, any_hit, intersection);
        self.push_hit_group(
            EntryPointRole::HitGroupAlt(AltGeometry::Particle),
            hit_index,
            shaders,
        )
    }

    /// Register a curve hit group at `hit_index`.
    pub fn add_curve_hit_group(
        &mut self,
        hit_index: u32,
        closest_hit: &str,
        any_hit: &str,
        intersection: &str,
    ) -> Result<&mut Self> {
        let shaders = HitGroupShaders::new(closest_hit, any_hit, intersection);
        self.push_hit_group(
            EntryPointRole::HitGroupAlt(AltGeometry::Curve),
            hit_index,
            shaders,
        )
    }

    /// Register a particle hit group using the shaders of hit group `hit_index`.
    ///
    /// Fails with [`RtError::IndexOutOfRange`] when no hit group is registered
    /// at `hit_index`. That includes an unregistered gap below the hit-group
    /// count, in which case the reported count exceeds the index.
    pub fn add_particle_hit_group_from_hit_group(&mut self, hit_index: u32) -> Result<&mut Self> {
        self.push_alt_from_hit_group(AltGeometry::Particle, hit_index)
    }

    /// Register a curve hit group using the shaders of hit group `hit_index`.
    ///
    /// Same failure modes as [`add_particle_hit_group_from_hit_group`](Self::add_particle_hit_group_from_hit_group).
    pub fn add_curve_hit_group_from_hit_group(&mut self, hit_index: u32) -> Result<&mut Self> {
        self.push_alt_from_hit_group(AltGeometry::Curve, hit_index)
    }

    /// Add or replace a global define.
    pub fn add_define(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.defines.add(name, value);
        self
    }

    /// Merge a define list. Existing keys are overwritten.
    pub fn add_defines(&mut self, defines: &DefineList) -> &mut Self {
        self.defines.extend(defines);
        self
    }

    /// Set the compiler flags. Replaces any previously set flags.
    pub fn set_compiler_flags(&mut self, flags: CompilerFlags) -> &mut Self {
        self.compiler_flags = flags;
        self
    }

    /// Set the max trace recursion depth. Validated at program creation.
    pub fn set_max_trace_recursion_depth(&mut self, depth: u32) -> &mut Self {
        self.max_trace_recursion_depth = depth;
        self
    }

    /// Shader libraries in the order they were added.
    #[must_use]
    pub fn libraries(&self) -> &[PathBuf] {
        &self.libraries
    }

    /// Path of library `index`.
    #[must_use]
    pub fn library(&self, index: usize) -> Option<&Path> {
        self.libraries.get(index).map(PathBuf::as_path)
    }

    /// Registrations in registration order.
    #[must_use]
    pub fn registrations(&self) -> &[EntryPointRegistration] {
        &self.registrations
    }

    /// Global defines.
    #[must_use]
    pub fn defines(&self) -> &DefineList {
        &self.defines
    }

    /// Compiler flags.
    #[must_use]
    pub fn compiler_flags(&self) -> CompilerFlags {
        self.compiler_flags
    }

    /// Max trace recursion depth as set by the caller.
    #[must_use]
    pub fn max_trace_recursion_depth(&self) -> u32 {
        self.max_trace_recursion_depth
    }

    /// Number of slots in the table for `role` (highest ordinal + 1).
    #[must_use]
    pub fn slot_count(&self, role: EntryPointRole) -> u32 {
        self.registrations
            .iter()
            .filter(|r| r.role == role)
            .map(|r| r.ordinal.saturating_add(1))
            .max()
            .unwrap_or(0)
    }

    /// Registration at `ordinal` in the table for `role`.
    #[must_use]
    pub fn find(&self, role: EntryPointRole, ordinal: u32) -> Option<&EntryPointRegistration> {
        self.registrations
            .iter()
            .find(|r| r.role == role && r.ordinal == ordinal)
    }

    fn current_library(&self) -> Result<usize> {
        self.libraries.len().checked_sub(1).ok_or_else(|| {
            RtError::InvalidConfiguration(
                "no shader library added before registering entry points".to_string(),
            )
        })
    }

    fn general_name(role: EntryPointRole, name: &str) -> Result<String> {
        if name.is_empty() {
            return Err(RtError::InvalidConfiguration(format!(
                "{role} entry point name is empty"
            )));
        }
        Ok(name.to_string())
    }

    fn ensure_slot_free(&self, role: EntryPointRole, ordinal: u32) -> Result<()> {
        if ordinal > MAX_SLOT_ORDINAL {
            return Err(RtError::ConfigurationLimitExceeded {
                what: "slot ordinal",
                value: ordinal,
                max: MAX_SLOT_ORDINAL,
            });
        }
        if self.find(role, ordinal).is_some() {
            return Err(RtError::InvalidConfiguration(format!(
                "{role} slot {ordinal} is already in use"
            )));
        }
        Ok(())
    }

    fn push_hit_group(
        &mut self,
        role: EntryPointRole,
        hit_index: u32,
        shaders: HitGroupShaders,
    ) -> Result<&mut Self> {
        if shaders.is_empty() {
            return Err(RtError::InvalidConfiguration(format!(
                "{role} group {hit_index} has no closest-hit, any-hit or intersection shader"
            )));
        }
        let library = self.current_library()?;
        self.ensure_slot_free(role, hit_index)?;
        self.registrations.push(EntryPointRegistration {
            role,
            ordinal: hit_index,
            library,
            shaders: EntryPointShaders::HitGroup(shaders),
        });
        Ok(self)
    }

    fn push_alt_from_hit_group(&mut self, kind: AltGeometry, hit_index: u32) -> Result<&mut Self> {
        let role = EntryPointRole::HitGroupAlt(kind);
        let source = self
            .find(EntryPointRole::HitGroup, hit_index)
            .ok_or_else(|| {
                RtError::out_of_range(
                    EntryPointRole::HitGroup.table_name(),
                    hit_index,
                    self.slot_count(EntryPointRole::HitGroup) as usize,
                )
            })?;
        let registration = EntryPointRegistration {
            role,
            ordinal: hit_index,
            library: source.library,
            shaders: source.shaders.clone(),
        };
        self.ensure_slot_free(role, hit_index)?;
        self.registrations.push(registration);
        Ok(self)
    }
}
