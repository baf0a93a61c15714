//! One cancellable wake-up task per pending shot.
//!
//! The task sleeps until the preheat instant (if requested), issues the
//! preheat, sleeps until the scheduled time, then dispatches the profile.
//! Cancellation is only observed while sleeping; a dispatch that has begun
//! always runs to completion. Every step re-checks the shot's status and its
//! own token through [`Registry::transition_armed`], so a cancel or disarm
//! that lands first always wins, even against a task left over from before a
//! restart.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    clock::Clock,
    device::DeviceCommandClient,
    registry::Registry,
    types::{ScheduledShot, ShotId, ShotStatus},
};

/// Recorded on a shot whose time had already passed when it was armed.
pub const EXPIRED_BEFORE_ARM: &str = "scheduled time elapsed before the shot could be armed";

/// Cancellable handle to a shot's wake-up task.
#[derive(Debug)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Stop the wake-up task if it has not begun dispatching yet.
    pub fn disarm(self) {
        self.token.cancel();
    }
}

pub struct Executor {
    device: Arc<dyn DeviceCommandClient>,
    clock: Arc<dyn Clock>,
    preheat_lead: Duration,
}

impl Executor {
    pub fn new(
        device: Arc<dyn DeviceCommandClient>,
        clock: Arc<dyn Clock>,
        preheat_lead: Duration,
    ) -> Self {
        Self {
            device,
            clock,
            preheat_lead,
        }
    }

    /// Spawn the wake-up task for `shot` and attach its handle to the registry.
    ///
    /// A shot whose scheduled time is not in the future is never dispatched:
    /// it is marked `failed` and `false` is returned. Must be called from
    /// within a Tokio runtime.
    pub fn arm(&self, registry: &Arc<Registry>, shot: &ScheduledShot) -> bool {
        if shot.scheduled_time <= self.clock.now() {
            warn!(shot_id = %shot.id, at = %shot.scheduled_time, "shot expired before arming, skipping");
            if let Err(e) = registry.transition(
                &shot.id,
                ShotStatus::Failed,
                Some(EXPIRED_BEFORE_ARM.to_string()),
            ) {
                debug!(shot_id = %shot.id, "expired shot already settled: {e}");
            }
            return false;
        }

        let token = CancellationToken::new();
        let wake = Wake {
            id: shot.id.clone(),
            profile_id: shot.profile_id.clone(),
            preheat_at: shot.preheat.then(|| {
                shot.scheduled_time
                    .checked_sub_signed(self.preheat_lead)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC)
            }),
            run_at: shot.scheduled_time,
        };
        tokio::spawn(wake.drive(
            Arc::clone(registry),
            Arc::clone(&self.device),
            Arc::clone(&self.clock),
            token.clone(),
        ));

        let attached = registry.attach_timer(&shot.id, TimerHandle::new(token));
        debug!(shot_id = %shot.id, attached, "timer armed");
        attached
    }
}

/// Everything the wake-up task needs, captured at arm time.
struct Wake {
    id: ShotId,
    profile_id: Option<String>,
    preheat_at: Option<DateTime<Utc>>,
    run_at: DateTime<Utc>,
}

impl Wake {
    async fn drive(
        self,
        registry: Arc<Registry>,
        device: Arc<dyn DeviceCommandClient>,
        clock: Arc<dyn Clock>,
        token: CancellationToken,
    ) {
        let id = &self.id;

        if let Some(preheat_at) = self.preheat_at {
            if !sleep_until(clock.as_ref(), preheat_at, &token).await {
                debug!(shot_id = %id, "disarmed before preheat");
                return;
            }
            if let Err(e) = registry.transition_armed(id, ShotStatus::Preheating, &token) {
                debug!(shot_id = %id, "preheat skipped: {e}");
                return;
            }
            info!(shot_id = %id, device = device.name(), "preheating");
            // Best effort: a failed preheat never blocks the run.
            if let Err(e) = device.preheat().await {
                warn!(shot_id = %id, "preheat failed: {e}");
            }
        }

        if !sleep_until(clock.as_ref(), self.run_at, &token).await {
            debug!(shot_id = %id, "disarmed before run");
            return;
        }
        if let Err(e) = registry.transition_armed(id, ShotStatus::Running, &token) {
            debug!(shot_id = %id, "run skipped: {e}");
            return;
        }

        let outcome = match self.profile_id.as_deref() {
            Some(profile_id) => {
                info!(shot_id = %id, %profile_id, device = device.name(), "running profile");
                device.run_profile(profile_id).await
            }
            None => Ok(()),
        };

        let settled = match outcome {
            Ok(()) => {
                info!(shot_id = %id, "shot completed");
                registry.transition(id, ShotStatus::Completed, None)
            }
            Err(e) => {
                error!(shot_id = %id, "dispatch failed: {e}");
                registry.transition(id, ShotStatus::Failed, Some(e.to_string()))
            }
        };
        if let Err(e) = settled {
            warn!(shot_id = %id, "could not record outcome: {e}");
        }
    }
}

/// Sleep until `at` on `clock`. Returns `false` if disarmed first.
async fn sleep_until(clock: &dyn Clock, at: DateTime<Utc>, token: &CancellationToken) -> bool {
    let delay = (at - clock.now()).to_std().unwrap_or_default();
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
