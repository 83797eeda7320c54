// Configuration management for panfilter
// Handles loading/saving settings, with sensible defaults when config is missing

use crate::filters::column::{FilterColumn, FilterColumnRegistry};
use crate::filters::search::SearchMode;
use crate::selection::TrackAction;
use anyhow::Result;
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub music_directories: Vec<PathBuf>,
    pub log_directory: PathBuf,
    pub filters: FilterSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub columns: Vec<FilterColumn>,
    pub default_group: String,
    pub double_click: TrackAction,
    pub middle_click: TrackAction,
    // Auto playlist: every selection change sends the tracks to a named playlist
    pub playlist_enabled: bool,
    pub auto_playlist: String,
    pub keep_alive: bool,
    pub auto_switch: bool,
    pub send_playback: bool,
    pub search: SearchSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub min_length: usize,
    pub timeout_ms: u64,
    pub mode: SearchMode,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            columns: FilterColumnRegistry::default_columns(),
            default_group: "Default".to_string(),
            double_click: TrackAction::AddCurrentPlaylist,
            middle_click: TrackAction::None,
            playlist_enabled: false,
            auto_playlist: "Filter Results".to_string(),
            keep_alive: false,
            auto_switch: true,
            send_playback: false,
            search: SearchSettings::default(),
        }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            min_length: 2,
            timeout_ms: 5000,
            mode: SearchMode::Substring,
        }
    }
}

impl SearchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl FilterSettings {
    pub fn column_registry(&self) -> FilterColumnRegistry {
        FilterColumnRegistry::new(self.columns.clone())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            music_directories: vec![
                dirs::audio_dir().unwrap_or_else(|| PathBuf::from("~/Music")),
            ],
            log_directory: PathBuf::from("logs"),
            filters: FilterSettings::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from an explicit path, writing defaults there if it doesn't exist yet
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?
            .join("panfilter");

        Ok(config_dir.join("config.toml"))
    }
}
