//! CapyLauncher - icon cache host for the app launcher
//!
//! Wires one icon engine, feeds it the application registry and drives its
//! cooperative warm-up from a timer, the same way the launcher UI does.

mod event_bus;
mod registry;
mod status;

use capy_icons::{EngineConfig, IconCacheEngine, default_config_path};
use clap::{Parser, Subcommand};
use log::{info, warn};
use registry::{AppRegistry, RegistryWriteBack, SharedRegistry, default_registry_path};
use status::StatusIndicator;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::time::MissedTickBehavior;

/// Build and maintain the launcher's icon cache.
#[derive(Parser, Debug)]
#[command(name = "capy-launcher", version, about = "Launcher icon cache", long_about = None)]
struct Cli {
    /// Engine config file (JSON).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Application registry file (JSON).
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    /// Override the icon artifact directory.
    #[arg(long, global = true)]
    icon_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Warm the icon cache for every registered app.
    Warm,

    /// Resolve one executable or icon file and describe the result.
    Resolve {
        /// Executable or icon file path.
        path: String,
    },

    /// Delete every cached icon, in memory and on disk.
    Clear,

    /// Delete degenerate or corrupt icon artifacts.
    Prune,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(default_config_path);
    let mut config = EngineConfig::load(&config_path);
    if let Some(icon_dir) = cli.icon_dir {
        config.icon_dir = Some(icon_dir);
    }

    let mut engine = IconCacheEngine::new(config);

    let registry_path = cli.registry.unwrap_or_else(default_registry_path);

    match cli.command {
        Command::Warm => {
            let registry: SharedRegistry = Arc::new(Mutex::new(AppRegistry::load(&registry_path)?));
            warm(&mut engine, registry.clone()).await;
            save_if_dirty(&registry, &registry_path)?;
        }
        Command::Resolve { path } => {
            let registry: SharedRegistry = Arc::new(Mutex::new(AppRegistry::load(&registry_path)?));
            {
                let registry = registry.lock().map_err(|e| e.to_string())?;
                engine.register_apps(&registry.warmup_entries());
            }
            engine.set_icon_path_sink(Box::new(RegistryWriteBack::new(registry.clone())));

            match engine.resolve_entry(&path) {
                Some(icon) => {
                    let (w, h) = icon.size_pixels();
                    println!("file:   {}", icon.disk_path.display());
                    println!("size:   {}x{}", w, h);
                    match icon.source_path {
                        Some(source) => println!("source: {}", source.display()),
                        None if icon.fallback => println!("source: placeholder"),
                        None => println!("source: icon file"),
                    }
                }
                None => println!("placeholder"),
            }
            save_if_dirty(&registry, &registry_path)?;
        }
        Command::Clear => {
            let removed = engine.clear_icon_cache();
            println!("Removed {} cached icons", removed);
        }
        Command::Prune => {
            let removed = engine.prune();
            println!("Removed {} broken icons", removed);
        }
    }

    Ok(())
}

fn save_if_dirty(registry: &SharedRegistry, path: &Path) -> Result<(), Box<dyn Error>> {
    let mut registry = registry.lock().map_err(|e| e.to_string())?;
    if registry.is_dirty() {
        registry.save(path)?;
        info!("Saved icon paths to {:?}", path);
    }
    Ok(())
}

/// Tick the engine until the warm-up job is done or Ctrl+C is pressed.
async fn warm(engine: &mut IconCacheEngine, registry: SharedRegistry) {
    let entries = match registry.lock() {
        Ok(registry) => registry.warmup_entries(),
        Err(e) => {
            warn!("Registry lock poisoned: {}", e);
            return;
        }
    };

    engine.set_icon_path_sink(Box::new(RegistryWriteBack::new(registry)));

    let mut rx = engine.subscribe();
    let mut status = StatusIndicator::new();
    engine.start_warmup(entries);

    let mut interval = tokio::time::interval(engine.config().tick_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                engine.tick();
            }
            _ = tokio::signal::ctrl_c() => {
                engine.cancel_warmup();
            }
        }

        for event in event_bus::drain_latest(&mut rx) {
            status.handle(&event);
        }

        if !engine.is_building() {
            break;
        }
    }
}
