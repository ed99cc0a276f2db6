//! Core types and errors for rtpipe.
//!
//! This crate provides the foundational types shared by the program model and
//! its GPU backends:
//! - The [`RtError`] taxonomy
//! - Scene and layout identities
//! - Define lists and compiler flags

pub mod defines;
pub mod error;
pub mod types;

pub use defines::DefineList;
pub use error::{Result, RtError};
pub use types::{CompilerFlags, GeometryTypes, LayoutId, SceneId};

/// Default limits used when a program is created without explicit sizes.
pub mod constants {
    /// Default maximum ray payload size in bytes.
    pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 128;
    /// Default maximum hit attribute size in bytes (D3D12 hard limit).
    pub const DEFAULT_MAX_ATTRIBUTES_SIZE: u32 = 32;
    /// Default maximum trace recursion depth.
    pub const DEFAULT_MAX_TRACE_RECURSION_DEPTH: u32 = 1;
    /// Largest recursion depth any supported API can declare.
    pub const API_MAX_TRACE_RECURSION_DEPTH: u32 = 31;
    /// Largest ordinal a miss or hit-group slot may be registered at.
    pub const MAX_SLOT_ORDINAL: u32 = 0xFFFF;
}
