//! Engine Error Types

use thiserror::Error;

/// Errors that can occur in the RF engine
///
/// Only construction, configuration and settings I/O surface these. The
/// render and control paths absorb failures into counters and logs.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Could not determine settings path")]
    SettingsPathUnavailable,

    #[error("Failed to spawn {name} thread: {reason}")]
    ThreadSpawn { name: &'static str, reason: String },

    #[error("Power lock error: {0}")]
    PowerLock(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("DSP error: {0}")]
    DspError(#[from] rfmix_dsp::DspError),

    #[error("Platform error: {0}")]
    PlatformError(#[from] rfmix_platform::PlatformError),
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
