use std::{sync::Arc, time::Duration};

use shotsched_core::config::RETENTION_WINDOW_SECS;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::{clock::Clock, registry::Registry};

/// Periodically evicts terminal shots older than the retention window.
///
/// Terminal shots are never on disk, so the sweep only touches memory.
pub struct Janitor {
    registry: Arc<Registry>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    retention: chrono::Duration,
}

impl Janitor {
    pub fn new(registry: Arc<Registry>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            registry,
            clock,
            interval,
            retention: chrono::Duration::seconds(RETENTION_WINDOW_SECS as i64),
        }
    }

    /// One pass. Returns the number of shots evicted.
    pub fn sweep(&self) -> usize {
        let evicted = self
            .registry
            .evict_finished(self.clock.now(), self.retention);
        if evicted > 0 {
            info!(count = evicted, "janitor evicted finished shots");
        }
        evicted
    }

    /// Sweep every `interval` until `shutdown` broadcasts `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        debug!(interval_secs = self.interval.as_secs(), "janitor started");
        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("janitor shutting down");
                        break;
                    }
                }
            }
        }
    }
}
