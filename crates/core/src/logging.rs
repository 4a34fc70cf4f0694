//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Default filter used when `RUST_LOG` is unset or invalid.
const DEFAULT_FILTER: &str = "info,ember=debug,ember_rhi=debug,ember_renderer=debug,gltf=warn";

/// Installs the global tracing subscriber.
///
/// Filtering honours `RUST_LOG` and falls back to [`DEFAULT_FILTER`]. Calling
/// this twice panics inside `tracing-subscriber`, so only the binary calls it.
///
/// ```no_run
/// ember_core::init_logging();
/// tracing::info!("engine starting");
/// ```
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}
