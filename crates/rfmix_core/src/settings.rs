//! Persistent Mixer Settings
//!
//! Saves the operator's mix (master gain and per-channel gain/pan/active)
//! so a restarted session comes back with the same balance.
//!
//! # Storage Locations
//! - Linux: `~/.config/rfmix/mixer.json`
//! - Windows: `%APPDATA%\rfmix\config\mixer.json`
//! - macOS: `~/Library/Application Support/com.rfmix.rfmix/mixer.json`

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rfmix_platform::ChannelId;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::{EngineError, EngineResult};

/// Saved parameters for one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    pub gain_db: f32,
    pub pan: f32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Root settings structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MixerSettings {
    pub master_gain_db: f32,
    #[serde(default)]
    pub channels: BTreeMap<ChannelId, ChannelSettings>,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl MixerSettings {
    /// Load settings from the default location, or defaults if missing/corrupt
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                match Self::load_from(&path) {
                    Ok(settings) => {
                        info!("Mixer settings loaded from {:?}", path);
                        return settings;
                    }
                    Err(e) => error!("Failed to read mixer settings: {}", e),
                }
            }
        }

        info!("Using default mixer settings");
        Self::default()
    }

    pub fn load_from(path: impl AsRef<Path>) -> EngineResult<Self> {
        let file = fs::File::open(path.as_ref())?;
        Ok(serde_json::from_reader(file)?)
    }

    /// Save to the default location, returning the path written
    pub fn save(&mut self) -> EngineResult<PathBuf> {
        let path = Self::config_path().ok_or(EngineError::SettingsPathUnavailable)?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save to `path`, stamping `saved_at`
    pub fn save_to(&mut self, path: impl AsRef<Path>) -> EngineResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        self.saved_at = Some(Utc::now());
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;

        info!("Mixer settings saved to {:?}", path);
        Ok(())
    }

    /// Get the platform-specific settings file path
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "rfmix", "rfmix")
            .map(|proj| proj.config_dir().join("mixer.json"))
    }
}
