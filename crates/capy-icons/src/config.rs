//! Engine configuration, stored as JSON.

use crate::bitmap::IconSize;
use crate::builder::DEFAULT_BATCH_SIZE;
use crate::disk_cache::DEGENERATE_THRESHOLD;
use crate::error::{IconError, IconResult};
use crate::paths::default_icon_dir;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Edge of every cached icon, in pixels.
    pub icon_size: u32,
    /// Entries materialized per warm-up tick.
    pub batch_size: usize,
    /// Artifacts at or below this many bytes are regenerated.
    pub degenerate_threshold: u64,
    /// Artifact directory; None means the platform default.
    pub icon_dir: Option<PathBuf>,
    /// Entries in the render path's normalization cache.
    pub micro_cache_capacity: usize,
    /// Period the host should tick at.
    pub tick_interval_ms: u64,
    /// Write resolved artifact paths back into the registry.
    pub persist_icon_paths: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            icon_size: IconSize::default().pixels(),
            batch_size: DEFAULT_BATCH_SIZE,
            degenerate_threshold: DEGENERATE_THRESHOLD,
            icon_dir: None,
            micro_cache_capacity: 256,
            tick_interval_ms: 100,
            persist_icon_paths: true,
        }
    }
}

impl EngineConfig {
    /// Load from a config file. Missing or unreadable files give defaults.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(config) => config,
            Err(IconError::Io(e)) if e.kind() == ErrorKind::NotFound => Self::default(),
            Err(e) => {
                warn!("Ignoring icon config {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn try_load(path: &Path) -> IconResult<Self> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| IconError::Config(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> IconResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| IconError::Config(e.to_string()))?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn icon_size(&self) -> IconSize {
        IconSize::new(self.icon_size)
    }

    pub fn icon_dir(&self) -> PathBuf {
        self.icon_dir.clone().unwrap_or_else(default_icon_dir)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}
