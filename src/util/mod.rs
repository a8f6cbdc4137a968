//! Utilities: constants and tracing setup

pub mod constants;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber with env-filter support.
///
/// Honors `RUST_LOG` (e.g. `RUST_LOG=weft=debug`); defaults to `warn`.
/// Safe to call more than once — later calls are ignored.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}
