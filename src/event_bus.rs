//! Draining the engine's broadcast channel from a polling timer.
//!
//! The host polls once per tick and processes everything pending in one go.
//! Progress is only interesting in its latest form; lifecycle events are all
//! kept, in order.

use capy_icons::IconEvent;
use tokio::sync::broadcast::{self, Receiver};

/// Drain all pending events, keeping only the latest `Progress`.
/// Handles `Lagged` by continuing to drain.
#[inline]
pub fn drain_latest(rx: &mut Receiver<IconEvent>) -> Vec<IconEvent> {
    let mut events = Vec::with_capacity(8);

    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Empty) => break,
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue, // Skip old, keep draining
            Err(broadcast::error::TryRecvError::Closed) => break,
        }
    }

    if events.len() <= 1 {
        return events;
    }

    let last_progress = events.iter().rposition(IconEvent::is_progress);
    events
        .into_iter()
        .enumerate()
        .filter(|(i, event)| !event.is_progress() || Some(*i) == last_progress)
        .map(|(_, event)| event)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use capy_icons::IconEvents;

    #[test]
    fn test_keeps_latest_progress_and_all_lifecycle_events() {
        let events = IconEvents::new();
        let mut rx = events.subscribe();

        events.send(IconEvent::WarmupStarted { job: 1, total: 30 });
        for processed in [10, 20, 30] {
            events.send(IconEvent::Progress {
                job: 1,
                processed,
                total: 30,
            });
        }
        events.send(IconEvent::WarmupCompleted { job: 1, total: 30 });

        assert_eq!(
            drain_latest(&mut rx),
            vec![
                IconEvent::WarmupStarted { job: 1, total: 30 },
                IconEvent::Progress {
                    job: 1,
                    processed: 30,
                    total: 30
                },
                IconEvent::WarmupCompleted { job: 1, total: 30 },
            ]
        );
        assert!(drain_latest(&mut rx).is_empty());
    }

    #[test]
    fn test_survives_lagging() {
        let events = IconEvents::new();
        let mut rx = events.subscribe();

        for processed in 0..200 {
            events.send(IconEvent::Progress {
                job: 7,
                processed,
                total: 200,
            });
        }

        assert_eq!(
            drain_latest(&mut rx),
            vec![IconEvent::Progress {
                job: 7,
                processed: 199,
                total: 200
            }]
        );
    }
}
