//! Cooperative warm-up of the working set.
//!
//! The host calls [`IncrementalCacheBuilder::tick`] from whatever periodic
//! primitive it owns. Each tick materializes at most `batch_size` entries, so
//! a job of `T` entries finishes in exactly `ceil(T / batch_size)` ticks.

use crate::disk_cache::IconDiskCache;
use crate::source::IconSource;
use crate::working_set::{CachedIcon, IconKey, IconWorkingSet};
use log::{debug, info};
use std::path::{Path, PathBuf};

pub type JobId = u64;

pub const DEFAULT_BATCH_SIZE: usize = 10;

/// One application to warm, as handed over by the registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WarmupEntry {
    pub app_id: String,
    pub executable_path: PathBuf,
    /// Previously resolved icon file, if the registry has one.
    pub icon_path_hint: Option<PathBuf>,
}

impl WarmupEntry {
    pub fn new(app_id: impl Into<String>, executable_path: impl Into<PathBuf>) -> Self {
        Self {
            app_id: app_id.into(),
            executable_path: executable_path.into(),
            icon_path_hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<PathBuf>) -> Self {
        let hint = hint.into();
        self.icon_path_hint = (!hint.as_os_str().is_empty()).then_some(hint);
        self
    }

    fn hint(&self) -> Option<&Path> {
        self.icon_path_hint.as_deref()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuilderState {
    Idle,
    Building,
}

/// `(processed, total)` of a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    pub job: JobId,
    pub processed: usize,
    pub total: usize,
}

/// Pending warm-up. The cursor only moves forward and never passes the end.
#[derive(Debug)]
pub struct CacheBuildJob {
    id: JobId,
    queue: Vec<WarmupEntry>,
    cursor: usize,
}

impl CacheBuildJob {
    fn new(id: JobId, queue: Vec<WarmupEntry>) -> Self {
        Self { id, queue, cursor: 0 }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn total(&self) -> usize {
        self.queue.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_complete(&self) -> bool {
        self.cursor == self.queue.len()
    }

    fn progress(&self) -> Progress {
        Progress {
            job: self.id,
            processed: self.cursor,
            total: self.queue.len(),
        }
    }
}

/// What `start` did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StartReport {
    pub job: JobId,
    pub total: usize,
    /// The job that was still building and got dropped.
    pub preempted: Option<Progress>,
}

/// Outcome of one tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// None when the builder was idle.
    pub progress: Option<Progress>,
    /// True on the tick that finished the job, and only that one.
    pub completed: bool,
    /// `(app_id, disk_path)` for icons freshly extracted and persisted.
    pub persisted: Vec<(String, PathBuf)>,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.progress.is_none()
    }
}

pub struct IncrementalCacheBuilder {
    batch_size: usize,
    job: Option<CacheBuildJob>,
    next_id: JobId,
}

impl IncrementalCacheBuilder {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            job: None,
            next_id: 1,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn state(&self) -> BuilderState {
        match self.job {
            Some(_) => BuilderState::Building,
            None => BuilderState::Idle,
        }
    }

    pub fn current_job(&self) -> Option<&CacheBuildJob> {
        self.job.as_ref()
    }

    pub fn progress(&self) -> Option<Progress> {
        self.job.as_ref().map(CacheBuildJob::progress)
    }

    /// Replace any running job. An empty job never enters `Building`; the
    /// caller reports it complete right away.
    pub fn start(&mut self, entries: Vec<WarmupEntry>) -> StartReport {
        let preempted = self.job.take().map(|job| {
            info!(
                "Warm-up job {} preempted at {}/{}",
                job.id,
                job.cursor,
                job.total()
            );
            job.progress()
        });

        let id = self.next_id;
        self.next_id += 1;
        let total = entries.len();

        if total > 0 {
            self.job = Some(CacheBuildJob::new(id, entries));
        }
        info!("Warm-up job {} started with {} apps", id, total);

        StartReport {
            job: id,
            total,
            preempted,
        }
    }

    /// Drop the running job. Entries already in the working set stay.
    pub fn cancel(&mut self) -> Option<Progress> {
        let job = self.job.take()?;
        info!(
            "Warm-up job {} cancelled at {}/{}",
            job.id,
            job.cursor,
            job.total()
        );
        Some(job.progress())
    }

    /// Process the next batch in queue order.
    pub fn tick(
        &mut self,
        working_set: &mut IconWorkingSet,
        disk: &IconDiskCache,
        source: &IconSource,
    ) -> TickReport {
        let Some(job) = self.job.as_mut() else {
            return TickReport::default();
        };

        let end = (job.cursor + self.batch_size).min(job.queue.len());
        let mut persisted = Vec::new();

        for entry in &job.queue[job.cursor..end] {
            if already_warm(working_set, disk, entry) {
                continue;
            }

            let outcome = disk.ensure_icon(&entry.executable_path, entry.hint(), source);
            if outcome.persisted {
                persisted.push((entry.app_id.clone(), outcome.icon.disk_path.clone()));
            }
            replace_stale_hint(working_set, entry, &outcome.key, &outcome.icon);
            working_set.put(outcome.key, outcome.icon);
        }
        job.cursor = end;

        let progress = job.progress();
        let completed = job.is_complete();
        debug!(
            "Warm-up job {}: {}/{}",
            progress.job, progress.processed, progress.total
        );

        if completed {
            info!("Warm-up job {} completed ({} apps)", progress.job, progress.total);
            self.job = None;
        }

        TickReport {
            progress: Some(progress),
            completed,
            persisted,
        }
    }
}

impl Default for IncrementalCacheBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

/// Fallback slots left by the paint path do not count as warm.
fn already_warm(working_set: &IconWorkingSet, disk: &IconDiskCache, entry: &WarmupEntry) -> bool {
    if let Some(hint) = entry.hint() {
        if working_set.is_warm(&IconKey::from_path(hint)) {
            return true;
        }
    }
    let artifact = disk.path_for(&entry.executable_path, None);
    working_set.is_warm(&IconKey::from_path(&artifact))
}

/// A row still painting a stale hint gets the regenerated icon under that
/// hint key too, until the registry stores the new path.
fn replace_stale_hint(
    working_set: &mut IconWorkingSet,
    entry: &WarmupEntry,
    key: &IconKey,
    icon: &CachedIcon,
) {
    let Some(hint) = entry.hint() else {
        return;
    };
    let hint_key = IconKey::from_path(hint);
    let stale = working_set.get(&hint_key).is_some_and(|slot| slot.fallback);
    if stale && hint_key != *key {
        working_set.put(hint_key, icon.clone());
    }
}
