//! Shared building blocks for the ember renderer.
//!
//! - [`Error`] / [`Result`] used by the platform and application layers
//! - [`init_logging`] to install the tracing subscriber
//! - [`FrameClock`] for nanosecond frame deltas
//! - [`EngineConfig`] describing window, resolution and asset locations

mod config;
mod error;
mod logging;
mod timer;

pub use config::{COMPUTE_LOCAL_SIZE, EngineConfig};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::FrameClock;
