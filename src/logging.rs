//! Logging initialization for Lazarillo.
//!
//! One compact `tracing` subscriber for the whole process. `RUST_LOG` wins
//! when set; otherwise the configured level applies.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// Call this once at startup before any tracing events are emitted.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .init();
}
