//! The engine façade the host wires once at startup.
//!
//! `IconCacheEngine` owns every layer and is driven from a single thread:
//! render calls and `tick()` interleave but never run concurrently. It is
//! `Send`, so a host may move it onto a worker, but it is not `Sync`.

use crate::bitmap::Bitmap;
use crate::builder::{BuilderState, IncrementalCacheBuilder, JobId, Progress, TickReport, WarmupEntry};
use crate::config::EngineConfig;
use crate::disk_cache::IconDiskCache;
use crate::events::{IconEvent, IconEvents};
use crate::render::IconRenderAdapter;
use crate::source::IconSource;
use crate::working_set::{CachedIcon, IconWorkingSet};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::Receiver;

/// Receives artifact paths worth remembering, so later runs skip extraction.
pub trait IconPathSink: Send {
    fn icon_path_resolved(&mut self, app_id: &str, disk_path: &Path);
}

impl<F> IconPathSink for F
where
    F: FnMut(&str, &Path) + Send,
{
    fn icon_path_resolved(&mut self, app_id: &str, disk_path: &Path) {
        self(app_id, disk_path)
    }
}

pub struct IconCacheEngine {
    config: EngineConfig,
    source: IconSource,
    disk: IconDiskCache,
    working_set: IconWorkingSet,
    render: IconRenderAdapter,
    builder: IncrementalCacheBuilder,
    events: IconEvents,
    sink: Option<Box<dyn IconPathSink>>,
}

impl IconCacheEngine {
    /// Engine with the platform's native extraction backend.
    pub fn new(config: EngineConfig) -> Self {
        let source = IconSource::new(config.icon_size());
        Self::with_source(config, source)
    }

    pub fn with_source(config: EngineConfig, source: IconSource) -> Self {
        let icon_dir = config.icon_dir();
        info!(
            "Icon engine: {}px icons in {:?}, batch {}",
            config.icon_size().pixels(),
            icon_dir,
            config.batch_size
        );

        Self {
            disk: IconDiskCache::new(icon_dir, config.icon_size())
                .with_degenerate_threshold(config.degenerate_threshold),
            render: IconRenderAdapter::new(config.micro_cache_capacity),
            builder: IncrementalCacheBuilder::new(config.batch_size),
            working_set: IconWorkingSet::new(),
            events: IconEvents::new(),
            sink: None,
            source,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn source(&self) -> &IconSource {
        &self.source
    }

    pub fn disk_cache(&self) -> &IconDiskCache {
        &self.disk
    }

    pub fn working_set(&self) -> &IconWorkingSet {
        &self.working_set
    }

    pub fn set_icon_path_sink(&mut self, sink: Box<dyn IconPathSink>) {
        self.sink = Some(sink);
    }

    pub fn subscribe(&self) -> Receiver<IconEvent> {
        self.events.subscribe()
    }

    /// Bitmap for a row's icon file or executable. Never fails.
    pub fn resolve(&mut self, path: &str) -> Bitmap {
        let bitmap = self
            .render
            .resolve(path, &mut self.working_set, &self.disk, &self.source);
        let write_backs = self.render.take_write_backs();
        self.write_back(&write_backs);
        bitmap
    }

    /// Tell the paint path which app owns which executable, without warming.
    /// `start_warmup` does this for its own entries.
    pub fn register_apps(&mut self, entries: &[WarmupEntry]) {
        for entry in entries {
            self.render.register_owner(entry, &self.disk);
        }
    }

    /// Resolve and return the whole working-set entry.
    pub fn resolve_entry(&mut self, path: &str) -> Option<CachedIcon> {
        self.resolve(path);
        let key = self.render.key_for(path, &self.disk);
        self.working_set.get(&key).cloned()
    }

    /// Forget the in-memory icon for `path`. The artifact stays on disk.
    pub fn invalidate(&mut self, path: &str) -> bool {
        let key = self.render.key_for(path, &self.disk);
        self.render.forget(path);
        let removed = self.working_set.invalidate(&key);
        debug!("Invalidated icon {} ({})", key, removed);
        removed
    }

    /// Invalidate and delete the executable's artifact, for deleted apps or
    /// replaced binaries.
    pub fn purge(&mut self, executable_path: &str) -> bool {
        self.invalidate(executable_path);
        let artifact = self.disk.path_for(Path::new(executable_path.trim()), None);
        match fs::remove_file(&artifact) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!("Failed to delete {:?}: {}", artifact, e);
                false
            }
        }
    }

    /// Drop every icon from memory and disk. Returns artifacts removed.
    pub fn clear_icon_cache(&mut self) -> usize {
        self.working_set.invalidate_all();
        self.render.clear();
        let removed = self.disk.clear();
        self.events.send(IconEvent::CacheCleared { removed });
        removed
    }

    /// Delete broken artifacts without touching good ones.
    pub fn prune(&mut self) -> usize {
        self.disk.prune()
    }

    /// Start warming. A running job is dropped.
    pub fn start_warmup(&mut self, entries: Vec<WarmupEntry>) -> JobId {
        self.register_apps(&entries);
        let report = self.builder.start(entries);

        if let Some(preempted) = report.preempted {
            self.events.send(IconEvent::cancelled(preempted));
        }
        self.events.send(IconEvent::WarmupStarted {
            job: report.job,
            total: report.total,
        });
        if report.total == 0 {
            self.events.send(IconEvent::WarmupCompleted {
                job: report.job,
                total: 0,
            });
        }

        report.job
    }

    /// Stop scheduling. Icons already warmed stay.
    pub fn cancel_warmup(&mut self) -> bool {
        match self.builder.cancel() {
            Some(progress) => {
                self.events.send(IconEvent::cancelled(progress));
                true
            }
            None => false,
        }
    }

    /// Advance the current job by one batch. Call from the host's timer.
    pub fn tick(&mut self) -> TickReport {
        let report = self
            .builder
            .tick(&mut self.working_set, &self.disk, &self.source);

        if let Some(progress) = report.progress {
            self.events.send(IconEvent::progress(progress));
            if report.completed {
                self.events.send(IconEvent::WarmupCompleted {
                    job: progress.job,
                    total: progress.total,
                });
            }
        }

        self.write_back(&report.persisted);
        report
    }

    fn write_back(&mut self, persisted: &[(String, PathBuf)]) {
        if !self.config.persist_icon_paths {
            return;
        }
        if let Some(sink) = self.sink.as_mut() {
            for (app_id, disk_path) in persisted {
                sink.icon_path_resolved(app_id, disk_path);
            }
        }
    }

    pub fn is_building(&self) -> bool {
        self.builder.state() == BuilderState::Building
    }

    pub fn progress(&self) -> Option<Progress> {
        self.builder.progress()
    }
}
