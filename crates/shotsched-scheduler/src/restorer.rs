use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    error::Result,
    executor::Executor,
    registry::Registry,
    types::ShotStatus,
};

/// Recorded on a persisted shot whose time passed while the process was down.
pub const EXPIRED_BEFORE_RESTART: &str = "expired before restart";

/// What a restore pass did with the store contents.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    /// Re-armed and waiting.
    pub restored: usize,
    /// Time already elapsed; marked `failed`, never dispatched.
    pub expired: usize,
    /// Records with a non-pending status, dropped.
    pub discarded: usize,
}

/// Reload pending shots from the store and re-arm the ones still in the future.
///
/// A shot that was `preheating` (or `running`) when the process died is
/// treated as freshly `scheduled`: the wake-up is re-derived from its
/// scheduled time alone.
pub fn restore(registry: &Arc<Registry>, executor: &Executor) -> Result<RestoreReport> {
    let candidates = registry.store().load()?;
    let now = registry.clock().now();
    let mut report = RestoreReport::default();
    let mut to_arm = Vec::new();

    for mut shot in candidates {
        if shot.status.is_terminal() {
            warn!(shot_id = %shot.id, status = %shot.status, "discarding non-pending shot from store");
            report.discarded += 1;
            continue;
        }
        if shot.status != ShotStatus::Scheduled {
            info!(shot_id = %shot.id, status = %shot.status, "resetting in-flight shot to scheduled");
            shot.status = ShotStatus::Scheduled;
        }

        if shot.scheduled_time <= now {
            warn!(shot_id = %shot.id, at = %shot.scheduled_time, "shot expired while offline");
            shot.status = ShotStatus::Failed;
            shot.error = Some(EXPIRED_BEFORE_RESTART.to_string());
            shot.finished_at = Some(now);
            registry.insert(shot);
            report.expired += 1;
            continue;
        }

        registry.insert(shot.clone());
        to_arm.push(shot);
    }

    // Rewrite the store so expired and discarded records are gone from disk.
    registry.persist();

    for shot in &to_arm {
        if executor.arm(registry, shot) {
            report.restored += 1;
        } else {
            report.expired += 1;
        }
    }

    info!(
        restored = report.restored,
        expired = report.expired,
        discarded = report.discarded,
        "restore complete"
    );
    Ok(report)
}
