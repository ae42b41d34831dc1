//! Tracing initialization for binaries and tests.
//!
//! The core itself only emits `tracing` events and spans; wiring them to an
//! output is the embedding process's call.

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG`. Safe to call more than
/// once; later calls are no-ops.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
