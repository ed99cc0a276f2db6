//! Identity handles and flag sets shared by the program model and its backends.

use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

static NEXT_SCENE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_LAYOUT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a scene bound to a program.
///
/// Two scenes compare equal only if they were handed the same id. Ids are
/// never reused within a process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SceneId(u64);

impl SceneId {
    /// Allocate a fresh, process-unique scene id.
    #[must_use]
    pub fn new() -> Self {
        Self(NEXT_SCENE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value, for logging.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl Default for SceneId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity of a variable (resource binding) layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct LayoutId(u64);

impl LayoutId {
    /// Allocate a fresh, process-unique layout id.
    #[must_use]
    pub fn new() -> Self {
        Self(NEXT_LAYOUT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value, for logging.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl Default for LayoutId {
    fn default() -> Self {
        Self::new()
    }
}

bitflags! {
    /// Shader compiler flags. Setting flags on a descriptor replaces the previous set.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct CompilerFlags: u32 {
        const TREAT_WARNINGS_AS_ERRORS = 1 << 0;
        const DUMP_INTERMEDIATES = 1 << 1;
        const FLOATING_POINT_MODE_FAST = 1 << 2;
        const FLOATING_POINT_MODE_PRECISE = 1 << 3;
        const GENERATE_DEBUG_INFO = 1 << 4;
    }
}

bitflags! {
    /// Geometry types present in a scene.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct GeometryTypes: u32 {
        const TRIANGLES = 1 << 0;
        const PROCEDURAL = 1 << 1;
        const PARTICLES = 1 << 2;
        const CURVES = 1 << 3;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_ids_are_unique() {
        let a = SceneId::new();
        let b = SceneId::new();
        assert_ne!(a, b);
        assert!(b.raw() > a.raw());
    }

    #[test]
    fn layout_ids_are_unique() {
        assert_ne!(LayoutId::new(), LayoutId::new());
    }

    #[test]
    fn compiler_flags_default_empty() {
        assert!(CompilerFlags::default().is_empty());
    }
}
