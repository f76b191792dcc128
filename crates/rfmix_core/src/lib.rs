//! RF Mix Core - Multi-Channel RF Render Engine
//!
//! This crate provides the real-time engine that mixes many independent RF
//! receiver channels into native stereo output streams, including:
//! - A bounded stream pool (one native stream per channel, LRU eviction)
//! - Write failure classification and tiered recovery
//! - Gain/pan mixing with soft clipping and per-channel metering
//! - Pull-based RF statistics and an event-publishing monitor
//! - A foreground session holding platform power locks
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │            RF receiver threads (one per channel)            │
//! │        render_channel_rf(channel, block, position)          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          RfEngine                           │
//! │   ChannelTable (striped) ──▶ mix ──▶ StreamPool (LRU, 48)   │
//! │                                          │                  │
//! │                        StreamBackend::write (no locks held) │
//! └─────────────────────────────────────────────────────────────┘
//!          │ snapshots                          │ native
//!          ▼ crossbeam-channel                  ▼
//!   Monitor ──Event──▶ UI               cpal / software backend
//! ```

mod channel;
mod config;
mod engine;
mod error;
mod message;
mod monitor;
mod pool;
mod render;
mod session;
mod settings;
mod stats;
mod stream;

#[cfg(test)]
mod testing;

pub use channel::ChannelState;
pub use config::{EngineConfig, PoolConfig, StreamConfig};
pub use engine::RfEngine;
pub use error::{EngineError, EngineResult};
pub use message::Event;
pub use monitor::{Monitor, DEFAULT_EVENT_CAPACITY, STATS_INTERVAL};
pub use pool::PooledStream;
pub use render::RenderOutcome;
pub use session::{NoopPowerGuard, PowerGuard, Session, SessionTiming, LOCK_TIMEOUT, RENEW_INTERVAL};
pub use settings::{ChannelSettings, MixerSettings};
pub use stats::{drop_rate, BufferInfo, ChannelRfStats, RfStats};
pub use stream::RecoveryAction;

// Re-export DSP and platform types for convenience
pub use rfmix_dsp::{db_to_linear, linear_to_db, soft_clip, RmsSource, MAX_GAIN_DB, MIN_GAIN_DB};
pub use rfmix_platform::{
    default_backend, supports_hardware_output, ChannelId, JitterConfig, PlatformError,
    RfStreamStats, SoftwareBackend, StreamBackend, StreamHandle,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        // Verify public API is accessible
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pool.max_streams, 48);
        assert_eq!(MIN_GAIN_DB, -60.0);
    }
}
