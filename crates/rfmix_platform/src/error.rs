//! Platform Error Types

use thiserror::Error;

use crate::traits::ChannelId;

/// Errors from the native output layer
///
/// From the engine's point of view any `Err` returned by a stream operation
/// is a "native exception": it is caught at the call site and folded into
/// the stream's failure bookkeeping.
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Invalid handle: {0}")]
    InvalidHandle(u64),

    #[error("Failed to create audio engine: {0}")]
    EngineCreationFailed(String),

    #[error("Failed to create stream for channel {channel}: {reason}")]
    StreamCreationFailed { channel: ChannelId, reason: String },

    #[error("Stream operation failed: {0}")]
    StreamOperationFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("No output device available")]
    NoOutputDevice,

    #[error("Unsupported stream format: {0}")]
    UnsupportedFormat(String),

    #[error("Feature not available on this platform: {0}")]
    FeatureNotAvailable(String),
}
