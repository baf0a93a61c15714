//! In-memory authoritative map of every known shot, pending or terminal.
//!
//! All mutation goes through one mutex. Store writes happen after the lock is
//! released; a separate persist lock orders them so the newest snapshot is
//! always the one left on disk.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::{
    clock::Clock,
    error::{Result, SchedulerError},
    executor::TimerHandle,
    store::ShotStore,
    types::{ScheduledShot, ShotId, ShotStatus},
};

/// A shot plus the cancellable handle of its wake-up task, if armed.
struct Entry {
    shot: ScheduledShot,
    timer: Option<TimerHandle>,
}

pub struct Registry {
    shots: Mutex<HashMap<ShotId, Entry>>,
    store: ShotStore,
    clock: Arc<dyn Clock>,
    persist_lock: Mutex<()>,
}

impl Registry {
    pub fn new(store: ShotStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            shots: Mutex::new(HashMap::new()),
            store,
            clock,
            persist_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &ShotStore {
        &self.store
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Validate a request, record the new shot and persist the pending set.
    ///
    /// Arming its timer is the caller's job (see [`crate::executor::Executor::arm`]).
    #[instrument(skip(self))]
    pub fn create(
        &self,
        profile_id: Option<String>,
        scheduled_time: DateTime<Utc>,
        preheat: bool,
    ) -> Result<ScheduledShot> {
        let profile_id = profile_id
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        if profile_id.is_none() && !preheat {
            return Err(SchedulerError::Validation(
                "a profile_id or preheat=true is required".to_string(),
            ));
        }

        let now = self.clock.now();
        if scheduled_time <= now {
            return Err(SchedulerError::Validation(format!(
                "scheduled_time {} is not in the future",
                scheduled_time.to_rfc3339()
            )));
        }

        let shot = ScheduledShot {
            id: ShotId::new(),
            profile_id,
            scheduled_time,
            preheat,
            status: ShotStatus::Scheduled,
            created_at: now,
            error: None,
            finished_at: None,
        };

        self.insert(shot.clone());
        self.persist();
        info!(shot_id = %shot.id, at = %shot.scheduled_time, "shot scheduled");
        Ok(shot)
    }

    /// Snapshot of every known shot, ordered by scheduled time.
    pub fn list(&self) -> Vec<ScheduledShot> {
        let shots = self.shots.lock().expect("shot registry poisoned");
        let mut out: Vec<_> = shots.values().map(|e| e.shot.clone()).collect();
        out.sort_by(|a, b| a.scheduled_time.cmp(&b.scheduled_time));
        out
    }

    pub fn get(&self, id: &ShotId) -> Result<ScheduledShot> {
        let shots = self.shots.lock().expect("shot registry poisoned");
        shots
            .get(id)
            .map(|e| e.shot.clone())
            .ok_or_else(|| SchedulerError::NotFound { id: id.to_string() })
    }

    /// Cancel a pending shot: disarm its timer, mark it `cancelled`, drop it
    /// from the store. The record stays in memory until the janitor evicts it.
    #[instrument(skip_all, fields(shot_id = %id))]
    pub fn cancel(&self, id: &ShotId) -> Result<ScheduledShot> {
        let shot = {
            let mut shots = self.shots.lock().expect("shot registry poisoned");
            let entry = shots
                .get_mut(id)
                .ok_or_else(|| SchedulerError::NotFound { id: id.to_string() })?;

            let status = entry.shot.status;
            if !status.can_transition_to(ShotStatus::Cancelled) {
                return Err(SchedulerError::InvalidState {
                    id: id.to_string(),
                    status,
                });
            }

            if let Some(timer) = entry.timer.take() {
                timer.disarm();
            }
            entry.shot.status = ShotStatus::Cancelled;
            entry.shot.finished_at = Some(self.clock.now());
            entry.shot.clone()
        };

        self.persist();
        info!("shot cancelled");
        Ok(shot)
    }

    /// Apply one state-machine edge on behalf of the executor.
    ///
    /// `error` is recorded only for `failed`. A terminal edge disarms the
    /// shot's timer. The store is rewritten only when the shot enters or
    /// leaves the pending set.
    #[instrument(skip_all, fields(shot_id = %id, next = %next))]
    pub fn transition(
        &self,
        id: &ShotId,
        next: ShotStatus,
        error: Option<String>,
    ) -> Result<ScheduledShot> {
        self.apply(id, next, error, None)
    }

    /// Like [`Registry::transition`], but refused once `token` has been
    /// disarmed. Checked under the registry lock, which every disarm holds,
    /// so a stale wake-up task can never move a re-armed shot.
    #[instrument(skip_all, fields(shot_id = %id, next = %next))]
    pub(crate) fn transition_armed(
        &self,
        id: &ShotId,
        next: ShotStatus,
        token: &CancellationToken,
    ) -> Result<ScheduledShot> {
        self.apply(id, next, None, Some(token))
    }

    fn apply(
        &self,
        id: &ShotId,
        next: ShotStatus,
        error: Option<String>,
        token: Option<&CancellationToken>,
    ) -> Result<ScheduledShot> {
        let (shot, store_changed) = {
            let mut shots = self.shots.lock().expect("shot registry poisoned");
            let entry = shots
                .get_mut(id)
                .ok_or_else(|| SchedulerError::NotFound { id: id.to_string() })?;

            let current = entry.shot.status;
            if !current.can_transition_to(next) || token.is_some_and(|t| t.is_cancelled()) {
                return Err(SchedulerError::InvalidState {
                    id: id.to_string(),
                    status: current,
                });
            }

            entry.shot.status = next;
            if next == ShotStatus::Failed {
                entry.shot.error = error;
            }
            if next.is_terminal() {
                entry.shot.finished_at = Some(self.clock.now());
                if let Some(timer) = entry.timer.take() {
                    timer.disarm();
                }
            }
            (
                entry.shot.clone(),
                current.is_pending() || next.is_pending(),
            )
        };

        if store_changed {
            self.persist();
        }
        debug!("transition applied");
        Ok(shot)
    }

    /// Remove terminal shots that finished more than `retention` before `now`.
    pub fn evict_finished(&self, now: DateTime<Utc>, retention: Duration) -> usize {
        let mut shots = self.shots.lock().expect("shot registry poisoned");
        let before = shots.len();
        shots.retain(|_, e| {
            !(e.shot.status.is_terminal()
                && e.shot.finished_at.is_some_and(|t| now - t > retention))
        });
        before - shots.len()
    }

    /// Whether a wake-up task is currently attached to `id`.
    pub fn is_armed(&self, id: &ShotId) -> bool {
        let shots = self.shots.lock().expect("shot registry poisoned");
        shots.get(id).is_some_and(|e| e.timer.is_some())
    }

    /// Disarm every timer. Shots keep their status and stay in the store.
    pub fn disarm_all(&self) -> usize {
        let mut shots = self.shots.lock().expect("shot registry poisoned");
        shots
            .values_mut()
            .filter_map(|e| e.timer.take())
            .map(TimerHandle::disarm)
            .count()
    }

    pub(crate) fn insert(&self, shot: ScheduledShot) {
        let mut shots = self.shots.lock().expect("shot registry poisoned");
        shots.insert(shot.id.clone(), Entry { shot, timer: None });
    }

    /// Attach a freshly armed timer. If the shot already left the pending set
    /// (cancelled or fired in the meantime) the timer is disarmed instead.
    pub(crate) fn attach_timer(&self, id: &ShotId, timer: TimerHandle) -> bool {
        let mut shots = self.shots.lock().expect("shot registry poisoned");
        match shots.get_mut(id) {
            Some(entry) if entry.shot.status.is_pending() => {
                if let Some(old) = entry.timer.replace(timer) {
                    old.disarm();
                }
                true
            }
            _ => {
                timer.disarm();
                false
            }
        }
    }

    /// Write the current pending set. Failures are logged, never rolled back.
    pub(crate) fn persist(&self) {
        let _guard = self.persist_lock.lock().expect("persist lock poisoned");
        let pending: Vec<ScheduledShot> = {
            let shots = self.shots.lock().expect("shot registry poisoned");
            shots
                .values()
                .filter(|e| e.shot.status.is_pending())
                .map(|e| e.shot.clone())
                .collect()
        };
        if let Err(e) = self.store.save(&pending) {
            error!(path = %self.store.path().display(), code = e.code(), "failed to persist pending shots: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> (Registry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = ShotStore::open(dir.path(), "shots.json");
        (Registry::new(store, clock.clone()), clock)
    }

    #[test]
    fn create_requires_profile_or_preheat() {
        let dir = TempDir::new().unwrap();
        let (reg, clock) = registry(&dir);
        let at = clock.now() + Duration::minutes(5);

        let err = reg.create(None, at, false).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let err = reg.create(Some("   ".to_string()), at, false).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let err = reg
            .create(None, clock.now() - Duration::minutes(5), false)
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(reg.list().is_empty());
    }

    #[test]
    fn create_rejects_non_future_time() {
        let dir = TempDir::new().unwrap();
        let (reg, clock) = registry(&dir);

        let err = reg.create(Some("p1".into()), clock.now(), false).unwrap_err();
        assert!(matches!(err, SchedulerError::Validation(_)));
    }

    #[test]
    fn create_persists_and_lists() {
        let dir = TempDir::new().unwrap();
        let (reg, clock) = registry(&dir);

        let shot = reg
            .create(Some("p1".into()), clock.now() + Duration::minutes(5), true)
            .unwrap();
        assert_eq!(shot.status, ShotStatus::Scheduled);
        assert_eq!(shot.created_at, clock.now());
        assert_eq!(reg.list(), vec![shot.clone()]);
        assert_eq!(reg.store().load().unwrap(), vec![shot]);
    }

    #[test]
    fn cancel_twice_is_invalid_state() {
        let dir = TempDir::new().unwrap();
        let (reg, clock) = registry(&dir);
        let shot = reg
            .create(Some("p1".into()), clock.now() + Duration::minutes(5), false)
            .unwrap();

        let cancelled = reg.cancel(&shot.id).unwrap();
        assert_eq!(cancelled.status, ShotStatus::Cancelled);
        assert!(reg.store().load().unwrap().is_empty());
        assert_eq!(reg.get(&shot.id).unwrap().status, ShotStatus::Cancelled);

        let err = reg.cancel(&shot.id).unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::InvalidState { status: ShotStatus::Cancelled, .. }
        ));
    }

    #[test]
    fn cancel_unknown_is_not_found() {
        let dir = TempDir::new().unwrap();
        let (reg, _) = registry(&dir);
        let err = reg.cancel(&ShotId::from("nope")).unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn transition_rejects_skipped_edges() {
        let dir = TempDir::new().unwrap();
        let (reg, clock) = registry(&dir);
        let shot = reg
            .create(Some("p1".into()), clock.now() + Duration::minutes(5), false)
            .unwrap();

        let err = reg
            .transition(&shot.id, ShotStatus::Completed, None)
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
        assert_eq!(reg.get(&shot.id).unwrap().status, ShotStatus::Scheduled);
    }

    #[test]
    fn preheating_stays_in_store_running_leaves_it() {
        let dir = TempDir::new().unwrap();
        let (reg, clock) = registry(&dir);
        let shot = reg
            .create(Some("p1".into()), clock.now() + Duration::minutes(5), true)
            .unwrap();

        reg.transition(&shot.id, ShotStatus::Preheating, None).unwrap();
        let stored = reg.store().load().unwrap();
        assert_eq!(stored[0].status, ShotStatus::Preheating);

        reg.transition(&shot.id, ShotStatus::Running, None).unwrap();
        assert!(reg.store().load().unwrap().is_empty());

        let failed = reg
            .transition(&shot.id, ShotStatus::Failed, Some("boom".into()))
            .unwrap();
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert_eq!(failed.finished_at, Some(clock.now()));
    }

    #[test]
    fn disarmed_timer_cannot_advance_a_rearmed_shot() {
        let dir = TempDir::new().unwrap();
        let (reg, clock) = registry(&dir);
        let shot = reg
            .create(Some("p1".into()), clock.now() + Duration::minutes(5), true)
            .unwrap();

        let stale = CancellationToken::new();
        assert!(reg.attach_timer(&shot.id, TimerHandle::new(stale.clone())));
        assert_eq!(reg.disarm_all(), 1);

        let fresh = CancellationToken::new();
        assert!(reg.attach_timer(&shot.id, TimerHandle::new(fresh.clone())));

        let err = reg
            .transition_armed(&shot.id, ShotStatus::Preheating, &stale)
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
        assert_eq!(reg.get(&shot.id).unwrap().status, ShotStatus::Scheduled);

        let moved = reg
            .transition_armed(&shot.id, ShotStatus::Preheating, &fresh)
            .unwrap();
        assert_eq!(moved.status, ShotStatus::Preheating);
        assert!(reg.is_armed(&shot.id));
    }

    #[test]
    fn evict_finished_respects_retention() {
        let dir = TempDir::new().unwrap();
        let (reg, clock) = registry(&dir);
        let keep = reg
            .create(Some("p1".into()), clock.now() + Duration::hours(3), false)
            .unwrap();
        let gone = reg
            .create(Some("p2".into()), clock.now() + Duration::hours(3), false)
            .unwrap();
        reg.cancel(&gone.id).unwrap();

        let retention = Duration::hours(1);
        assert_eq!(reg.evict_finished(clock.now() + Duration::minutes(59), retention), 0);
        assert_eq!(reg.evict_finished(clock.now() + Duration::minutes(61), retention), 1);
        assert_eq!(reg.evict_finished(clock.now() + Duration::minutes(61), retention), 0);
        assert_eq!(reg.list(), vec![keep]);
    }
}
