//! Warm-up status indicator.
//!
//! Fed with drained engine events once per tick. Repaints are requested once
//! per finished job, never per icon.

use capy_icons::{IconEvent, JobId};
use log::info;

#[derive(Debug, Default)]
pub struct StatusIndicator {
    job: Option<JobId>,
    processed: usize,
    total: usize,
    repaints: usize,
}

impl StatusIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&mut self, event: &IconEvent) {
        match *event {
            IconEvent::WarmupStarted { job, total } => {
                self.job = Some(job);
                self.processed = 0;
                self.total = total;
                info!("Caching icons for {} apps", total);
            }
            IconEvent::Progress {
                job,
                processed,
                total,
            } if self.job == Some(job) => {
                self.processed = processed;
                self.total = total;
                info!("{}", self.line());
            }
            IconEvent::Progress { .. } => {}
            IconEvent::WarmupCompleted { job, total } => {
                if self.job == Some(job) {
                    self.job = None;
                    self.processed = total;
                }
                self.repaints += 1;
                info!("Icon cache ready ({} apps), repainting", total);
            }
            IconEvent::WarmupCancelled {
                job,
                processed,
                total,
            } => {
                if self.job == Some(job) {
                    self.job = None;
                }
                info!("Icon caching stopped at {}/{}", processed, total);
            }
            IconEvent::CacheCleared { removed } => {
                self.repaints += 1;
                info!("Icon cache cleared ({} files)", removed);
            }
        }
    }

    /// e.g. "Caching icons 120/500 (24%)"
    pub fn line(&self) -> String {
        let percent = if self.total == 0 {
            100
        } else {
            self.processed * 100 / self.total
        };
        format!("Caching icons {}/{} ({}%)", self.processed, self.total, percent)
    }

    pub fn is_active(&self) -> bool {
        self.job.is_some()
    }

    /// How many times the list would have been repainted.
    pub fn repaints(&self) -> usize {
        self.repaints
    }
}
