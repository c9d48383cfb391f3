//! Warm-up notifications.
//!
//! Published on a tokio broadcast channel, so every subscriber sees every
//! event. There is never one event per icon: a status indicator gets progress
//! once per tick and a single `WarmupCompleted` to repaint on.

use crate::builder::{JobId, Progress};
use tokio::sync::broadcast::{self, Receiver, Sender};

/// Broadcast channel capacity. Lagging receivers skip old progress.
pub const CHANNEL_CAPACITY: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IconEvent {
    WarmupStarted { job: JobId, total: usize },
    Progress { job: JobId, processed: usize, total: usize },
    /// All rows may need repaint.
    WarmupCompleted { job: JobId, total: usize },
    WarmupCancelled { job: JobId, processed: usize, total: usize },
    CacheCleared { removed: usize },
}

impl IconEvent {
    pub fn is_progress(&self) -> bool {
        matches!(self, IconEvent::Progress { .. })
    }

    pub(crate) fn progress(p: Progress) -> Self {
        IconEvent::Progress {
            job: p.job,
            processed: p.processed,
            total: p.total,
        }
    }

    pub(crate) fn cancelled(p: Progress) -> Self {
        IconEvent::WarmupCancelled {
            job: p.job,
            processed: p.processed,
            total: p.total,
        }
    }
}

/// Sending half owned by one engine.
#[derive(Clone)]
pub struct IconEvents {
    tx: Sender<IconEvent>,
}

impl IconEvents {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Non-blocking. Dropped when nobody listens.
    #[inline]
    pub fn send(&self, event: IconEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> Receiver<IconEvent> {
        self.tx.subscribe()
    }
}

impl Default for IconEvents {
    fn default() -> Self {
        Self::new()
    }
}
