//! Engine, Stream and Pool Configuration

use std::fs;
use std::path::Path;

use rfmix_dsp::RmsSource;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Native stream configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Sample rate in Hz (e.g., 44100, 48000, 96000)
    pub sample_rate: u32,

    /// Output channels per stream (2 = interleaved stereo)
    pub channels: u16,

    /// Native buffer size in frames, applied with `set_buffer_size` on creation
    pub buffer_size: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            buffer_size: 128,
        }
    }
}

impl StreamConfig {
    /// Calculate latency in milliseconds for this configuration
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate < 8000 || self.sample_rate > 192000 {
            return Err(format!("Invalid sample rate: {}", self.sample_rate));
        }
        if self.channels != 2 {
            return Err(format!(
                "Invalid channel count: {} (render output is stereo)",
                self.channels
            ));
        }
        if self.buffer_size < 16 || self.buffer_size > 8192 {
            return Err(format!("Invalid buffer size: {}", self.buffer_size));
        }
        Ok(())
    }
}

/// Stream pool capacity and recovery thresholds
///
/// The reuse gate and the write-path escalation steps count the same
/// `consecutive_failures` but fire at different points:
///
/// ```text
/// failures:  1        2              3          ... 5+
///            clear    not reusable   restart        destroy
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Upper bound on live streams; the least recently written is evicted
    pub max_streams: usize,

    /// A stream with this many failures is recreated on the next lookup
    pub reuse_failure_threshold: u32,

    /// Failure count at which the native stream is stopped and restarted
    pub restart_on_failure: u32,

    /// Failure count at or above which the stream is destroyed
    pub destroy_on_failure: u32,

    /// Minimum spacing between corrective buffer clears
    pub min_clear_interval_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_streams: 48,
            reuse_failure_threshold: 2,
            restart_on_failure: 3,
            destroy_on_failure: 5,
            min_clear_interval_ms: 500,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_streams == 0 {
            return Err("max_streams must be at least 1".into());
        }
        if self.reuse_failure_threshold == 0 {
            return Err("reuse_failure_threshold must be at least 1".into());
        }
        if !(1 < self.restart_on_failure && self.restart_on_failure < self.destroy_on_failure) {
            return Err(format!(
                "Invalid escalation order: clear at 1, restart at {}, destroy at {}",
                self.restart_on_failure, self.destroy_on_failure
            ));
        }
        Ok(())
    }
}

/// Overall engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Stream configuration
    pub stream: StreamConfig,

    /// Pool capacity and recovery policy
    #[serde(default)]
    pub pool: PoolConfig,

    /// Monitor polling interval (~5Hz by default)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Signal the RMS meter reads from
    #[serde(default)]
    pub rms_source: RmsSource,
}

fn default_poll_interval_ms() -> u64 {
    200
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            pool: PoolConfig::default(),
            poll_interval_ms: default_poll_interval_ms(),
            rms_source: RmsSource::default(),
        }
    }
}

impl EngineConfig {
    /// Create config optimized for low latency
    pub fn low_latency() -> Self {
        Self {
            stream: StreamConfig {
                sample_rate: 48000,
                channels: 2,
                buffer_size: 64, // ~1.3ms
            },
            ..Default::default()
        }
    }

    /// Create config optimized for stability on congested RF links
    pub fn stable() -> Self {
        Self {
            stream: StreamConfig {
                sample_rate: 48000,
                channels: 2,
                buffer_size: 512, // ~10.7ms
            },
            pool: PoolConfig {
                min_clear_interval_ms: 1000,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Load and validate a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        self.stream.validate().map_err(EngineError::ConfigError)?;
        self.pool.validate().map_err(EngineError::ConfigError)?;
        if self.poll_interval_ms == 0 {
            return Err(EngineError::ConfigError(
                "poll_interval_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.stream.sample_rate, 48000);
        assert_eq!(config.stream.channels, 2);
        assert_eq!(config.stream.buffer_size, 128);
        assert_eq!(config.pool.max_streams, 48);
        assert_eq!(config.pool.reuse_failure_threshold, 2);
        assert_eq!(config.pool.restart_on_failure, 3);
        assert_eq!(config.pool.destroy_on_failure, 5);
        assert_eq!(config.pool.min_clear_interval_ms, 500);
        assert_eq!(config.poll_interval_ms, 200);
        assert_eq!(config.rms_source, RmsSource::PreGain);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_latency_calculation() {
        let config = StreamConfig {
            sample_rate: 48000,
            channels: 2,
            buffer_size: 480, // Exactly 10ms at 48kHz
        };
        assert!((config.latency_ms() - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_stream_validation() {
        let invalid_rate = StreamConfig {
            sample_rate: 100,
            ..Default::default()
        };
        assert!(invalid_rate.validate().is_err());

        let invalid_buffer = StreamConfig {
            buffer_size: 10,
            ..Default::default()
        };
        assert!(invalid_buffer.validate().is_err());

        let mono = StreamConfig {
            channels: 1,
            ..Default::default()
        };
        assert!(mono.validate().is_err());
    }

    #[test]
    fn test_escalation_order_validation() {
        let inverted = PoolConfig {
            restart_on_failure: 5,
            destroy_on_failure: 3,
            ..Default::default()
        };
        assert!(inverted.validate().is_err());

        let restart_at_clear = PoolConfig {
            restart_on_failure: 1,
            ..Default::default()
        };
        assert!(restart_at_clear.validate().is_err());

        let no_reuse = PoolConfig {
            reuse_failure_threshold: 0,
            ..Default::default()
        };
        assert!(no_reuse.validate().is_err());
    }

    #[test]
    fn test_preset_configs() {
        let low_latency = EngineConfig::low_latency();
        let stable = EngineConfig::stable();

        assert!(low_latency.validate().is_ok());
        assert!(stable.validate().is_ok());
        assert!(low_latency.stream.latency_ms() < stable.stream.latency_ms());
    }

    #[test]
    fn test_config_partial_json() {
        // Older files only carry the stream section
        let json = r#"{ "stream": { "sample_rate": 44100, "channels": 2, "buffer_size": 256 } }"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.stream.sample_rate, 44100);
        assert_eq!(config.pool, PoolConfig::default());
        assert_eq!(config.poll_interval_ms, 200);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = std::env::temp_dir().join(format!("rfmix-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.json");
        fs::write(
            &path,
            r#"{ "stream": { "sample_rate": 1000, "channels": 2, "buffer_size": 128 } }"#,
        )
        .unwrap();

        assert!(matches!(
            EngineConfig::load(&path),
            Err(EngineError::ConfigError(_))
        ));
        let _ = fs::remove_dir_all(&dir);
    }
}
