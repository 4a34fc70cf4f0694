//! Error types shared by the non-GPU layers.

use thiserror::Error;

/// Error type for window, configuration and bootstrap failures.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan surface or extension enumeration failed.
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window creation or handle retrieval failed.
    #[error("Window error: {0}")]
    Window(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine configuration is unusable.
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using the shared [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;
