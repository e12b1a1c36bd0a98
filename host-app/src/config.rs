//! Host configuration.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::info;

use titan_core::SessionConfig;
use titan_engine::SimConfig;

/// Environment variable naming a config file when no argument is given.
pub const CONFIG_ENV: &str = "TITAN_CONFIG";

/// Simulated canvas settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

impl CanvasConfig {
    pub fn sim_config(&self) -> SimConfig {
        SimConfig {
            width: self.width,
            height: self.height,
            fps: self.fps,
            ..SimConfig::default()
        }
    }
}

/// Everything the host process needs to start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub session: SessionConfig,

    /// SQLite file holding the saved scene collection.
    pub database_path: PathBuf,

    pub canvas: CanvasConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            database_path: PathBuf::from("titan-state.db"),
            canvas: CanvasConfig::default(),
        }
    }
}

impl HostConfig {
    /// Load from `path`, else from `$TITAN_CONFIG`, else defaults.
    pub fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let path = path.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        match path {
            Some(path) => Self::from_file(&path),
            None => {
                info!("No config file given, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        info!("Config loaded from {}", path.display());
        Ok(config)
    }
}
