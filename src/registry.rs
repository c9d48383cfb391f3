//! JSON application registry.
//!
//! Only the parts the icon engine needs: turning records into warm-up
//! entries and remembering resolved icon paths for the next run.

use capy_icons::{IconPathSink, WarmupEntry};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// One registered application.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppRecord {
    pub id: String,
    pub name: String,
    /// Executable path
    pub path: String,
    /// Resolved icon file, empty until the engine writes one back
    pub icon_path: String,
    pub category: String,
    pub launch_count: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppRegistry {
    #[serde(default)]
    pub apps: Vec<AppRecord>,
    #[serde(skip)]
    dirty: bool,
}

impl AppRegistry {
    /// Load from disk. A missing file is an empty registry; a malformed one is
    /// an error, so it never gets overwritten by an empty save.
    pub fn load(path: &Path) -> io::Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => {
                let registry: Self = serde_json::from_str(&text)?;
                info!("Loaded {} apps from {:?}", registry.apps.len(), path);
                Ok(registry)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("No registry at {:?}, starting empty", path);
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    pub fn save(&mut self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        self.dirty = false;
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Warm-up tuples in registry order. Records without an executable are
    /// skipped.
    pub fn warmup_entries(&self) -> Vec<WarmupEntry> {
        self.apps
            .iter()
            .filter(|app| !app.path.trim().is_empty())
            .map(|app| WarmupEntry::new(&app.id, &app.path).with_hint(&app.icon_path))
            .collect()
    }

    /// Record a resolved icon file. Returns false for unknown ids or when
    /// nothing changed.
    pub fn set_icon_path(&mut self, app_id: &str, icon_path: &Path) -> bool {
        let Some(app) = self.apps.iter_mut().find(|a| a.id == app_id) else {
            debug!("Icon path for unknown app {}", app_id);
            return false;
        };

        let icon_path = icon_path.to_string_lossy();
        if app.icon_path == icon_path {
            return false;
        }
        app.icon_path = icon_path.into_owned();
        self.dirty = true;
        true
    }
}

/// Registry shared between the host loop and the engine's write-back.
pub type SharedRegistry = Arc<Mutex<AppRegistry>>;

/// Feeds resolved icon paths back into the registry.
pub struct RegistryWriteBack {
    registry: SharedRegistry,
}

impl RegistryWriteBack {
    pub fn new(registry: SharedRegistry) -> Self {
        Self { registry }
    }
}

impl IconPathSink for RegistryWriteBack {
    fn icon_path_resolved(&mut self, app_id: &str, disk_path: &Path) {
        match self.registry.lock() {
            Ok(mut registry) => {
                registry.set_icon_path(app_id, disk_path);
            }
            Err(e) => warn!("Registry lock poisoned: {}", e),
        }
    }
}

/// Default registry location.
pub fn default_registry_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("CapyLauncher")
        .join("apps.json")
}
