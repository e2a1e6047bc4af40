use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::Deserialize;

use crate::analyzer::AnalyzerConfig;
use crate::audio_player::DEFAULT_CHUNK_SIZE;

pub const CONFIG_FILE_NAME: &str = "wavescope.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub analysis: AnalyzerConfig,
    #[serde(default)]
    pub view: ViewConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Output device name as printed by `--list-devices`. Default device if unset.
    #[serde(default)]
    pub output_device: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ViewConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Factor applied per zoom step.
    #[serde(default = "default_zoom_step")]
    pub zoom_step: f64,
    /// Fraction of the viewport width moved per scroll step.
    #[serde(default = "default_scroll_step")]
    pub scroll_step: f64,
    #[serde(default = "default_follow_playhead")]
    pub follow_playhead: bool,
    #[serde(default = "default_theme")]
    pub theme: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            output_device: None,
        }
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            zoom_step: default_zoom_step(),
            scroll_step: default_scroll_step(),
            follow_playhead: default_follow_playhead(),
            theme: default_theme(),
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_tick_ms() -> u64 {
    100
}

fn default_zoom_step() -> f64 {
    1.25
}

fn default_scroll_step() -> f64 {
    0.1
}

fn default_follow_playhead() -> bool {
    true
}

fn default_theme() -> String {
    "Catppuccin Mocha".into()
}

pub fn parse(content: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(content)
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match parse(&content) {
        Ok(config) => Some(config),
        Err(err) => {
            warn!("ignoring {}: {err}", path.display());
            None
        }
    }
}

/// Where a config file is looked for, in order. An explicit path replaces the
/// search.
pub fn search_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    if let Some(path) = explicit {
        return vec![path.to_path_buf()];
    }
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("wavescope").join("config.toml"));
    }
    paths
}

/// Loads the first config file found, or the defaults.
pub fn load(explicit: Option<&Path>) -> Config {
    for path in search_paths(explicit) {
        if !path.is_file() {
            continue;
        }
        if let Some(config) = load_config(&path) {
            info!("loaded config from {}", path.display());
            return config;
        }
    }
    if let Some(path) = explicit {
        warn!("config {} not usable, using defaults", path.display());
    }
    Config::default()
}
