//! Entry-point group index tables.
//!
//! Group indices are opaque identifiers handed out by the shader compiler.
//! The tables here only record them per role and ordinal.

use hashbrown::HashSet;
use rtpipe_core::{Result, RtError};

use crate::descriptor::{AltGeometry, EntryPointRole, ProgramDescriptor};

/// Group index assigned to one registered entry point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct GroupInfo {
    group_index: Option<u32>,
}

impl GroupInfo {
    /// Slot that no entry point was registered at.
    pub const UNASSIGNED: Self = Self { group_index: None };

    /// Slot holding `group_index`.
    #[must_use]
    pub const fn assigned(group_index: u32) -> Self {
        Self {
            group_index: Some(group_index),
        }
    }

    /// The group index, if assigned.
    #[inline]
    #[must_use]
    pub const fn group_index(self) -> Option<u32> {
        self.group_index
    }

    /// Whether an entry point occupies this slot.
    #[inline]
    #[must_use]
    pub const fn is_assigned(self) -> bool {
        self.group_index.is_some()
    }
}

/// Ordered group indices for one role.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryPointGroupIndex {
    role: EntryPointRole,
    groups: Vec<GroupInfo>,
}

impl EntryPointGroupIndex {
    /// Create an empty table for `role`.
    #[must_use]
    pub const fn new(role: EntryPointRole) -> Self {
        Self {
            role,
            groups: Vec::new(),
        }
    }

    /// Role recorded in this table.
    #[must_use]
    pub const fn role(&self) -> EntryPointRole {
        self.role
    }

    /// Number of slots.
    #[must_use]
    pub fn count(&self) -> u32 {
        // Registration caps ordinals at MAX_SLOT_ORDINAL, so the length fits.
        u32::try_from(self.groups.len()).unwrap_or(u32::MAX)
    }

    /// Slot info at `ordinal`.
    pub fn get(&self, ordinal: u32) -> Result<GroupInfo> {
        self.groups
            .get(ordinal as usize)
            .copied()
            .ok_or_else(|| RtError::out_of_range(self.role.table_name(), ordinal, self.groups.len()))
    }

    /// Group index at `ordinal`. `Ok(None)` for a slot nothing was registered at.
    pub fn index(&self, ordinal: u32) -> Result<Option<u32>> {
        self.get(ordinal).map(GroupInfo::group_index)
    }

    /// Iterate over all slots in ordinal order.
    pub fn iter(&self) -> impl Iterator<Item = GroupInfo> + '_ {
        self.groups.iter().copied()
    }

    fn assign(&mut self, ordinal: u32, group_index: u32) {
        let slot = ordinal as usize;
        if slot >= self.groups.len() {
            self.groups.resize(slot + 1, GroupInfo::UNASSIGNED);
        }
        self.groups[slot] = GroupInfo::assigned(group_index);
    }
}

/// Group index tables for every role of a program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupTables {
    /// Ray-generation groups, one per registered ray-gen entry point.
    pub ray_gen: EntryPointGroupIndex,
    /// Miss groups by miss ordinal.
    pub miss: EntryPointGroupIndex,
    /// Standard hit groups by hit ordinal.
    pub hit: EntryPointGroupIndex,
    /// Particle hit groups by hit ordinal.
    pub particle_hit: EntryPointGroupIndex,
    /// Curve hit groups by hit ordinal.
    pub curve_hit: EntryPointGroupIndex,
}

impl Default for GroupTables {
    fn default() -> Self {
        Self {
            ray_gen: EntryPointGroupIndex::new(EntryPointRole::RayGeneration),
            miss: EntryPointGroupIndex::new(EntryPointRole::Miss),
            hit: EntryPointGroupIndex::new(EntryPointRole::HitGroup),
            particle_hit: EntryPointGroupIndex::new(EntryPointRole::HitGroupAlt(
                AltGeometry::Particle,
            )),
            curve_hit: EntryPointGroupIndex::new(EntryPointRole::HitGroupAlt(AltGeometry::Curve)),
        }
    }
}

impl GroupTables {
    /// Record compiler-assigned group indices, one per registration of `desc`
    /// in registration order.
    ///
    /// Fails with [`RtError::CompilationFailed`] when the compiler returned the
    /// wrong number of indices or reused one.
    pub fn from_assignments(desc: &ProgramDescriptor, group_indices: &[u32]) -> Result<Self> {
        let registrations = desc.registrations();
        if registrations.len() != group_indices.len() {
            return Err(RtError::CompilationFailed(format!(
                "compiler returned {} group indices for {} entry points",
                group_indices.len(),
                registrations.len()
            )));
        }

        let mut seen = HashSet::with_capacity(group_indices.len());
        let mut tables = Self::default();
        for (registration, &group_index) in registrations.iter().zip(group_indices) {
            if !seen.insert(group_index) {
                return Err(RtError::CompilationFailed(format!(
                    "group index {group_index} assigned to more than one entry point"
                )));
            }
            tables
                .table_mut(registration.role)
                .assign(registration.ordinal, group_index);
        }
        Ok(tables)
    }

    /// Table for `role`.
    #[must_use]
    pub const fn table(&self, role: EntryPointRole) -> &EntryPointGroupIndex {
        match role {
            EntryPointRole::RayGeneration => &self.ray_gen,
            EntryPointRole::Miss => &self.miss,
            EntryPointRole::HitGroup => &self.hit,
            EntryPointRole::HitGroupAlt(AltGeometry::Particle) => &self.particle_hit,
            EntryPointRole::HitGroupAlt(AltGeometry::Curve) => &self.curve_hit,
        }
    }

    fn table_mut(&mut self, role: EntryPointRole) -> &mut EntryPointGroupIndex {
        match role {
            EntryPointRole::RayGeneration => &mut self.ray_gen,
            EntryPointRole::Miss => &mut self.miss,
            EntryPointRole::HitGroup => &mut self.hit,
            EntryPointRole::HitGroupAlt(AltGeometry::Particle) => &mut self.particle_hit,
            EntryPointRole::HitGroupAlt(AltGeometry::Curve) => &mut self.curve_hit,
        }
    }

    /// Tables in role order.
    pub fn iter(&self) -> impl Iterator<Item = &EntryPointGroupIndex> {
        [
            &self.ray_gen,
            &self.miss,
            &self.hit,
            &self.particle_hit,
            &self.curve_hit,
        ]
        .into_iter()
    }

    /// Total number of assigned groups across all tables.
    #[must_use]
    pub fn assigned_count(&self) -> usize {
        self.iter()
            .map(|t| t.iter().filter(|g| g.is_assigned()).count())
            .sum()
    }
}
