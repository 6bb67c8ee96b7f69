// src/logging.rs
// =============================================================================
// Optional tracing setup for binaries that embed the engine.
//
// The library itself only emits events. Hosts that already install a
// subscriber should not call this.
// =============================================================================

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs a stderr fmt subscriber. `RUST_LOG` wins over `default_filter`.
///
/// Returns an error if a global subscriber is already set.
pub fn init_tracing(default_filter: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .try_init()
}
