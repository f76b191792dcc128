use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use rfmix_core::EngineConfig;

/// Built-in configuration presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    Default,
    LowLatency,
    Stable,
}

#[derive(Debug, Parser, Clone)]
#[command(name = "rfmix")]
#[command(about = "Mix simulated RF receiver channels into stereo output")]
pub struct Cli {
    /// Engine configuration file (JSON). Overrides --preset.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Configuration preset used when no --config is given.
    #[arg(long, value_enum, default_value_t = Preset::Default)]
    pub preset: Preset,

    /// Number of simulated receivers.
    #[arg(long, default_value_t = 4)]
    pub channels: u32,

    /// Run time in seconds.
    #[arg(long, default_value_t = 10)]
    pub seconds: u64,

    /// Frames per RF block.
    #[arg(long, default_value_t = 256)]
    pub block_frames: usize,

    /// Gain applied to every channel (dB).
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub gain: f32,

    /// Master gain (dB).
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub master_gain: f32,

    /// Maximum concurrent native streams.
    #[arg(long)]
    pub max_streams: Option<usize>,

    /// Native buffer size in frames.
    #[arg(long)]
    pub buffer_size: Option<u32>,

    /// Never open an audio device; drain streams with a software clock.
    #[arg(long)]
    pub software: bool,

    /// Restore the saved mix before starting.
    #[arg(long)]
    pub load_settings: bool,

    /// Save the mix on exit.
    #[arg(long)]
    pub save_settings: bool,

    /// Print monitor events as JSON lines.
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Resolve the engine configuration from file/preset plus flag overrides
    pub fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path)?,
            None => match self.preset {
                Preset::Default => EngineConfig::default(),
                Preset::LowLatency => EngineConfig::low_latency(),
                Preset::Stable => EngineConfig::stable(),
            },
        };

        if let Some(max_streams) = self.max_streams {
            config.pool.max_streams = max_streams;
        }
        if let Some(buffer_size) = self.buffer_size {
            config.stream.buffer_size = buffer_size;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["rfmix"]);
        assert_eq!(cli.channels, 4);
        assert_eq!(cli.preset, Preset::Default);
        assert!(!cli.software);
        assert!(cli.engine_config().is_ok());
    }

    #[test]
    fn test_overrides_applied() {
        let cli = Cli::parse_from([
            "rfmix",
            "--preset",
            "low-latency",
            "--max-streams",
            "8",
            "--gain",
            "-6",
        ]);
        let config = cli.engine_config().unwrap();
        assert_eq!(config.pool.max_streams, 8);
        assert_eq!(config.stream.buffer_size, EngineConfig::low_latency().stream.buffer_size);
        assert_eq!(cli.gain, -6.0);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let cli = Cli::parse_from(["rfmix", "--buffer-size", "4"]);
        assert!(cli.engine_config().is_err());
    }
}
