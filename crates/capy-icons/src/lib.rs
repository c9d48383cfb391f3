//! capy-icons: Icon acquisition and caching for app launchers.
//!
//! Provides:
//! - Tiered icon extraction (native resource, file-type icon, placeholder)
//! - A deterministic PNG disk cache with degenerate/corrupt artifact repair
//! - An in-memory working set for O(1) lookups from paint callbacks
//! - Incremental warm-up driven by the host's own timer via `tick()`
//!
//! The engine is single-threaded by contract. Build one [`IconCacheEngine`]
//! at startup and hand it to whatever renders rows.

mod bitmap;
mod builder;
mod config;
mod disk_cache;
mod engine;
mod error;
mod events;
mod native;
mod paths;
mod render;
mod source;
mod working_set;

pub use bitmap::{Bitmap, IconSize, RawPixelBuffer, SMALL_ICON_THRESHOLD, fit_square, placeholder};
pub use builder::{
    BuilderState, CacheBuildJob, IncrementalCacheBuilder, JobId, Progress, StartReport, TickReport,
    WarmupEntry,
};
pub use config::EngineConfig;
pub use disk_cache::{DEGENERATE_THRESHOLD, EnsureOutcome, IconDiskCache, artifact_file_name};
pub use engine::{IconCacheEngine, IconPathSink};
pub use error::{IconError, IconResult};
pub use events::{CHANNEL_CAPACITY, IconEvent, IconEvents};
pub use native::{IconBackend, NullBackend, platform_backend};
pub use paths::{default_config_path, default_icon_dir};
pub use render::IconRenderAdapter;
pub use source::{ExtractStats, IconRequest, IconSource, Tier};
pub use working_set::{CachedIcon, IconKey, IconWorkingSet};
