//! Native Output Capability Interface
//!
//! The engine never talks to an audio API directly. Every platform adapter
//! implements [`StreamBackend`], a narrow per-stream capability set:
//! create / start / stop / write / clear / set-buffer-size / stats / destroy.

use std::fmt;
use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

use crate::error::PlatformError;

/// Logical RF channel identifier (0..N-1)
pub type ChannelId = u32;

/// Opaque handle to a native engine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineHandle(NonZeroU64);

impl EngineHandle {
    /// Wrap a raw native value; `0` is the invalid handle
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine#{}", self.0)
    }
}

/// Opaque handle to one native low-latency output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle(NonZeroU64);

impl StreamHandle {
    /// Wrap a raw native value; `0` is the invalid handle
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream#{}", self.0)
    }
}

/// Receiver-side statistics for one stream
///
/// Mirrors the native 7-slot integer tuple:
/// `[available_frames, latency_ms, is_receiving, underruns, drops, buffer_usage_percent, resets]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RfStreamStats {
    pub available_frames: u32,
    pub latency_ms: u32,
    pub is_receiving: bool,
    pub underruns: u32,
    pub drops: u32,
    pub buffer_usage_percent: u32,
    pub resets: u32,
}

impl RfStreamStats {
    pub const FIELD_COUNT: usize = 7;

    /// Decode the native tuple
    ///
    /// Older adapters report only six slots (no reset counter); missing
    /// slots read as zero and negative values are floored at zero.
    pub fn from_raw(raw: &[i32]) -> Self {
        let at = |i: usize| raw.get(i).copied().unwrap_or(0).max(0) as u32;
        Self {
            available_frames: at(0),
            latency_ms: at(1),
            is_receiving: at(2) == 1,
            underruns: at(3),
            drops: at(4),
            buffer_usage_percent: at(5),
            resets: at(6),
        }
    }

    pub fn to_raw(&self) -> [i32; Self::FIELD_COUNT] {
        let clamp = |v: u32| v.min(i32::MAX as u32) as i32;
        [
            clamp(self.available_frames),
            clamp(self.latency_ms),
            i32::from(self.is_receiving),
            clamp(self.underruns),
            clamp(self.drops),
            clamp(self.buffer_usage_percent),
            clamp(self.resets),
        ]
    }
}

/// Trait for native low-latency output adapters
///
/// # Contract
///
/// - Handles returned by `create_stream` stay valid until `destroy_stream`.
///   Operations on a destroyed handle return `PlatformError::InvalidHandle`.
/// - `write` takes interleaved frames (`channels` samples per frame) and
///   returns how many whole frames were accepted. A short count is a
///   transient shortfall; an `Err` is a native exception.
/// - Every call returns in bounded time. There are no internal timeouts.
pub trait StreamBackend: Send + Sync {
    /// Name of this backend (e.g., "software", "cpal")
    fn name(&self) -> &'static str;

    /// Create the native engine that owns all streams of an audio session
    fn create_engine(&self, sample_rate: u32, channels: u16)
        -> Result<EngineHandle, PlatformError>;

    /// Destroy the native engine and anything it still owns
    fn destroy_engine(&self, engine: EngineHandle);

    /// Open (but do not start) an output stream bound to `channel`
    fn create_stream(
        &self,
        engine: EngineHandle,
        channel: ChannelId,
    ) -> Result<StreamHandle, PlatformError>;

    fn start(&self, stream: StreamHandle) -> Result<(), PlatformError>;

    fn stop(&self, stream: StreamHandle) -> Result<(), PlatformError>;

    /// Queue interleaved frames; returns frames accepted
    fn write(&self, stream: StreamHandle, interleaved: &[f32]) -> Result<usize, PlatformError>;

    /// Drop everything queued on the device side
    fn clear_buffer(&self, stream: StreamHandle) -> Result<(), PlatformError>;

    /// Request a device buffer size; returns the size actually applied
    fn set_buffer_size(&self, stream: StreamHandle, frames: u32) -> Result<u32, PlatformError>;

    fn latency_ms(&self, stream: StreamHandle) -> Result<f32, PlatformError>;

    /// Frames currently queued for playback
    fn buffer_stats(&self, stream: StreamHandle) -> Result<u32, PlatformError>;

    fn rf_stats(&self, stream: StreamHandle) -> Result<RfStreamStats, PlatformError>;

    /// Stop and release the stream; the handle is invalid afterwards
    fn destroy_stream(&self, stream: StreamHandle) -> Result<(), PlatformError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_invalid_handle() {
        assert!(StreamHandle::from_raw(0).is_none());
        assert!(EngineHandle::from_raw(0).is_none());
        assert_eq!(StreamHandle::from_raw(9).map(StreamHandle::get), Some(9));
    }

    #[test]
    fn test_handle_display() {
        let handle = StreamHandle::from_raw(12).unwrap();
        assert_eq!(handle.to_string(), "stream#12");
    }

    #[test]
    fn test_rf_stats_from_raw() {
        let stats = RfStreamStats::from_raw(&[256, 5, 1, 3, 40, 12, 2]);
        assert_eq!(stats.available_frames, 256);
        assert_eq!(stats.latency_ms, 5);
        assert!(stats.is_receiving);
        assert_eq!(stats.underruns, 3);
        assert_eq!(stats.drops, 40);
        assert_eq!(stats.buffer_usage_percent, 12);
        assert_eq!(stats.resets, 2);
        assert_eq!(stats.to_raw(), [256, 5, 1, 3, 40, 12, 2]);
    }

    #[test]
    fn test_rf_stats_short_tuple() {
        // Six-slot tuple without reset counter
        let stats = RfStreamStats::from_raw(&[10, 1, 0, -4, 2, 1]);
        assert_eq!(stats.resets, 0);
        assert_eq!(stats.underruns, 0);
        assert!(!stats.is_receiving);
    }

    #[test]
    fn test_rf_stats_serialization() {
        let stats = RfStreamStats {
            drops: 9,
            ..Default::default()
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"drops\":9"));
    }
}
