//! RF Mix Platform - Native Output Adapters
//!
//! This crate provides the narrow native capability layer under the engine:
//! - Engine and per-channel stream lifecycle behind opaque handles
//! - Frame writes into a receiver-side jitter buffer
//! - Device-side statistics (latency, underruns, drops, resets)
//!
//! # Backends
//!
//! | Backend    | Device          | Feature | Notes                          |
//! |------------|-----------------|---------|--------------------------------|
//! | `software` | none (clocked)  | always  | Tests, headless runs, CI       |
//! | `cpal`     | default output  | `cpal`  | One device stream per channel  |
//!
//! # Architecture
//!
//! Each backend implements the `StreamBackend` trait. The engine only ever
//! holds `Arc<dyn StreamBackend>`, so adapters are swappable at runtime.

mod error;
mod jitter;
mod software;
mod traits;

#[cfg(feature = "cpal")]
mod cpal_backend;

use std::sync::Arc;

pub use error::PlatformError;
pub use jitter::{
    jitter_buffer, JitterConfig, JitterReader, JitterState, JitterWriter,
    DEFAULT_CAPACITY_FRAMES, DEFAULT_TARGET_FRAMES, MIN_TARGET_FRAMES,
};
pub use software::SoftwareBackend;
pub use traits::{ChannelId, EngineHandle, RfStreamStats, StreamBackend, StreamHandle};

#[cfg(feature = "cpal")]
pub use cpal_backend::CpalBackend;

/// Get the best available backend for this build
///
/// With the `cpal` feature this is the default host output device, falling
/// back to the software backend when no device is present.
pub fn default_backend() -> Arc<dyn StreamBackend> {
    #[cfg(feature = "cpal")]
    {
        match CpalBackend::new() {
            Ok(backend) => return Arc::new(backend),
            Err(e) => tracing::warn!("CPAL unavailable ({}), using software output", e),
        }
    }

    Arc::new(SoftwareBackend::new())
}

/// Whether this build can drive real audio hardware
pub fn supports_hardware_output() -> bool {
    cfg!(feature = "cpal")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backend_is_usable() {
        let backend = default_backend();
        assert!(!backend.name().is_empty());
        if !supports_hardware_output() {
            assert_eq!(backend.name(), "software");
        }
    }
}
