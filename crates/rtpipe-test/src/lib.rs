//! Test harness for rtpipe.
//!
//! Provides GPU-free doubles for every collaborator of the program model.

pub mod harness;

pub use harness::{
    path_tracer_descriptor, BuildRecord, FixedIndexCompiler, RecordingBackend, RecordingCompiler,
    TestLayout, TestProgram, TestScene, TestStateObject,
};

use tracing_subscriber::EnvFilter;

/// Install a test log subscriber. Safe to call from every test.
///
/// Respects `RUST_LOG`, defaulting to `debug` for rtpipe crates.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rtpipe_program=debug,rtpipe_vulkan=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
