//! Tracing subscriber setup.
//!
//! The core only emits `tracing` events; hosts embedding the crate usually
//! install their own subscriber. This initializer exists for binaries and
//! integration harnesses that want sane output with one call.

use tracing_subscriber::EnvFilter;

/// Environment variable controlling the log filter, e.g.
/// `CHATSUM_LOG=chatsum=debug`.
pub const LOG_ENV_VAR: &str = "CHATSUM_LOG";

/// Install a formatted subscriber filtered by `CHATSUM_LOG`, defaulting to
/// `info`. Safe to call more than once; later calls are no-ops.
pub fn init() {
    init_with_default("info");
}

/// Same as [`init`] with an explicit default filter directive.
pub fn init_with_default(default_directive: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
