use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a scheduled shot (UUIDv7, so ids sort by creation time).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShotId(pub String);

impl ShotId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ShotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ShotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ShotId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ShotId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle state of a scheduled shot.
///
/// ```text
/// scheduled ──► preheating ──► running ──► completed | failed
///     │             │
///     └─────────────┴──► cancelled
/// ```
///
/// `scheduled` may also go straight to `running` (no preheat requested) or to
/// `failed` (its time elapsed while the process was down).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShotStatus {
    /// Waiting for its preheat or run wake-up.
    Scheduled,
    /// Preheat issued; waiting for the run wake-up.
    Preheating,
    /// Profile dispatch in progress.
    Running,
    /// Dispatch succeeded.
    Completed,
    /// Dispatch failed, or the shot expired before it could fire.
    Failed,
    /// Cancelled by the user while still pending.
    Cancelled,
}

impl ShotStatus {
    /// Pending shots are the only ones written to the durable store.
    pub fn is_pending(self) -> bool {
        matches!(self, ShotStatus::Scheduled | ShotStatus::Preheating)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ShotStatus::Completed | ShotStatus::Failed | ShotStatus::Cancelled
        )
    }

    /// Whether `self → next` is a single legal edge of the state machine.
    pub fn can_transition_to(self, next: ShotStatus) -> bool {
        use ShotStatus::*;
        matches!(
            (self, next),
            (Scheduled, Preheating)
                | (Scheduled, Running)
                | (Scheduled, Cancelled)
                | (Scheduled, Failed)
                | (Preheating, Running)
                | (Preheating, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
        )
    }
}

impl fmt::Display for ShotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShotStatus::Scheduled => "scheduled",
            ShotStatus::Preheating => "preheating",
            ShotStatus::Running => "running",
            ShotStatus::Completed => "completed",
            ShotStatus::Failed => "failed",
            ShotStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ShotStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(ShotStatus::Scheduled),
            "preheating" => Ok(ShotStatus::Preheating),
            "running" => Ok(ShotStatus::Running),
            "completed" => Ok(ShotStatus::Completed),
            "failed" => Ok(ShotStatus::Failed),
            "cancelled" => Ok(ShotStatus::Cancelled),
            other => Err(format!("unknown shot status: {other}")),
        }
    }
}

/// A queued future actuation: preheat the device and/or run a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledShot {
    pub id: ShotId,
    /// Operating profile to run at `scheduled_time`, if any.
    pub profile_id: Option<String>,
    pub scheduled_time: DateTime<Utc>,
    pub preheat: bool,
    pub status: ShotStatus,
    pub created_at: DateTime<Utc>,
    /// Populated only when `status` is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the shot reached a terminal status; drives retention eviction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}
