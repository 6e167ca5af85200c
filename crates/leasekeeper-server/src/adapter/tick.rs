//! Local tick source
//!
//! Stands in for the external clock when the server runs standalone: emits
//! `LeaseEvent::Tick` at a fixed interval with consecutive indexes, starting
//! right after the last tick the manager processed.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use leasekeeper_common::Tick;
use leasekeeper_lease::LeaseEvent;

pub struct LocalTickSource {
    interval: Duration,
    next_index: Tick,
}

impl LocalTickSource {
    /// `last_tick` is the last index already seen, if any
    pub fn new(interval: Duration, last_tick: Option<Tick>) -> Self {
        Self {
            interval,
            next_index: last_tick.map_or(0, |t| t + 1),
        }
    }

    pub fn next_index(&self) -> Tick {
        self.next_index
    }

    /// Run until shutdown fires or the event channel closes
    pub fn spawn(
        mut self,
        events: mpsc::Sender<LeaseEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                start = self.next_index,
                interval_ms = self.interval.as_millis() as u64,
                "Tick source started"
            );

            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = interval.tick() => {
                        let index = self.next_index;
                        if events.send(LeaseEvent::Tick { index }).await.is_err() {
                            debug!("Event channel closed");
                            break;
                        }
                        self.next_index += 1;
                    }
                }
            }

            info!(next = self.next_index, "Tick source stopped");
        })
    }
}
