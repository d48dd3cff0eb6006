//! Tracing initialization. Thin on purpose: an `EnvFilter` plus an ANSI
//! formatter, matching the level of ceremony the rest of the ambient stack
//! uses for logging.

use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber reading `RUST_LOG` (falling back
/// to `info`). Safe to call once at process start; a second call is a
/// harmless no-op logged at `warn`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("telemetry::init called more than once; ignoring");
    }
}
