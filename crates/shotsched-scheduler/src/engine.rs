use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{DateTime, Utc};
use shotsched_core::config::{SchedulerConfig, DEFAULT_PREHEAT_LEAD_SECS};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::{
    clock::Clock,
    device::DeviceCommandClient,
    error::{Result, SchedulerError},
    executor::Executor,
    janitor::Janitor,
    registry::Registry,
    restorer::{restore, RestoreReport},
    store::ShotStore,
    types::{ScheduledShot, ShotId},
};

/// The scheduled-shot engine: registry, timers, restore and retention sweep
/// behind one explicitly started and stopped instance.
///
/// `start`, `create` and `cancel` must be called from within a Tokio runtime.
pub struct ShotScheduler {
    registry: Arc<Registry>,
    executor: Executor,
    clock: Arc<dyn Clock>,
    janitor_interval: Duration,
    /// `Some` while running.
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl ShotScheduler {
    pub fn new(
        config: &SchedulerConfig,
        store: ShotStore,
        device: Arc<dyn DeviceCommandClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let preheat_lead = preheat_lead(config.preheat_lead_secs);
        Self {
            registry: Arc::new(Registry::new(store, Arc::clone(&clock))),
            executor: Executor::new(device, Arc::clone(&clock), preheat_lead),
            clock,
            janitor_interval: Duration::from_secs(config.janitor_interval_secs.max(1)),
            shutdown_tx: Mutex::new(None),
        }
    }

    /// Restore persisted shots, re-arm their timers and start the janitor.
    ///
    /// Calling `start` on a running scheduler is a no-op.
    pub fn start(&self) -> Result<RestoreReport> {
        let mut shutdown_tx = self.shutdown_tx.lock().expect("lifecycle lock poisoned");
        if shutdown_tx.is_some() {
            warn!("scheduler already running");
            return Ok(RestoreReport::default());
        }

        let report = restore(&self.registry, &self.executor)?;

        let (tx, rx) = watch::channel(false);
        let janitor = Janitor::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.clock),
            self.janitor_interval,
        );
        tokio::spawn(janitor.run(rx));
        *shutdown_tx = Some(tx);

        info!("shot scheduler started");
        Ok(report)
    }

    /// Stop the janitor and disarm every timer. Pending shots stay in the
    /// store and are picked up again by the next `start`.
    pub fn stop(&self) {
        let Some(tx) = self
            .shutdown_tx
            .lock()
            .expect("lifecycle lock poisoned")
            .take()
        else {
            return;
        };
        let _ = tx.send(true);
        let disarmed = self.registry.disarm_all();
        info!(disarmed, "shot scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shutdown_tx
            .lock()
            .expect("lifecycle lock poisoned")
            .is_some()
    }

    /// Queue a new shot and arm its timer.
    pub fn create(
        &self,
        profile_id: Option<String>,
        scheduled_time: DateTime<Utc>,
        preheat: bool,
    ) -> Result<ScheduledShot> {
        self.ensure_running()?;
        let shot = self.registry.create(profile_id, scheduled_time, preheat)?;
        if !self.executor.arm(&self.registry, &shot) {
            return self.registry.get(&shot.id);
        }
        Ok(shot)
    }

    /// Every known shot, pending or recently finished.
    pub fn list(&self) -> Vec<ScheduledShot> {
        self.registry.list()
    }

    pub fn get(&self, id: &ShotId) -> Result<ScheduledShot> {
        self.registry.get(id)
    }

    /// Cancel a pending shot. Fails with `InvalidState` once it has started
    /// running or reached a terminal status.
    pub fn cancel(&self, id: &ShotId) -> Result<ScheduledShot> {
        self.ensure_running()?;
        self.registry.cancel(id)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(SchedulerError::NotStarted)
        }
    }
}

impl Drop for ShotScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Convert the configured lead, falling back to the default when it does not
/// fit a `chrono::Duration`.
fn preheat_lead(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or_else(|| {
            warn!(
                preheat_lead_secs = secs,
                "preheat lead out of range, using {DEFAULT_PREHEAT_LEAD_SECS}s"
            );
            chrono::Duration::seconds(DEFAULT_PREHEAT_LEAD_SECS as i64)
        })
}
