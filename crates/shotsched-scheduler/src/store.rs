//! Durable persistence of pending shots to a single JSON file.
//!
//! The file is an object keyed by shot id:
//!
//! ```json
//! {
//!   "0192…": {
//!     "profileId": "p1",
//!     "scheduledTime": "2026-10-19T07:30:00Z",
//!     "preheat": true,
//!     "status": "scheduled",
//!     "createdAt": "2026-10-18T22:10:04Z"
//!   }
//! }
//! ```
//!
//! Writes go to a temp file in the same directory, are fsynced, then renamed
//! over the target so a reader never sees a partial document. A file that
//! fails to parse is moved aside with a `.corrupt` suffix and treated as empty.

use std::{
    collections::BTreeMap,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::{
    error::Result,
    types::{ScheduledShot, ShotId, ShotStatus},
};

/// Directory name used under the OS temp dir when the primary is unusable.
const FALLBACK_DIR: &str = "shotsched";

/// On-disk form of a pending shot. The id is the map key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredShot {
    profile_id: Option<String>,
    scheduled_time: DateTime<Utc>,
    preheat: bool,
    status: ShotStatus,
    created_at: DateTime<Utc>,
}

impl From<&ScheduledShot> for StoredShot {
    fn from(shot: &ScheduledShot) -> Self {
        Self {
            profile_id: shot.profile_id.clone(),
            scheduled_time: shot.scheduled_time,
            preheat: shot.preheat,
            status: shot.status,
            created_at: shot.created_at,
        }
    }
}

impl StoredShot {
    fn into_shot(self, id: String) -> ScheduledShot {
        ScheduledShot {
            id: ShotId(id),
            profile_id: self.profile_id,
            scheduled_time: self.scheduled_time,
            preheat: self.preheat,
            status: self.status,
            created_at: self.created_at,
            error: None,
            finished_at: None,
        }
    }
}

/// Sole owner of the on-disk representation of pending shots.
#[derive(Debug, Clone)]
pub struct ShotStore {
    path: PathBuf,
}

impl ShotStore {
    /// Resolve the store location once: `primary_dir` if it can be created
    /// and written to, otherwise a directory under the OS temp dir.
    pub fn open(primary_dir: &Path, file_name: &str) -> Self {
        let dir = if is_writable(primary_dir) {
            primary_dir.to_path_buf()
        } else {
            let fallback = Self::fallback_dir();
            warn!(
                primary = %primary_dir.display(),
                fallback = %fallback.display(),
                "store directory not writable, falling back to temp dir"
            );
            if let Err(e) = fs::create_dir_all(&fallback) {
                error!(path = %fallback.display(), "cannot create fallback store dir: {e}");
            }
            fallback
        };

        let path = dir.join(file_name);
        info!(path = %path.display(), "shot store opened");
        Self { path }
    }

    /// Directory used when the configured one cannot be written.
    pub fn fallback_dir() -> PathBuf {
        std::env::temp_dir().join(FALLBACK_DIR)
    }

    /// Use `path` as-is, without probing or fallback. Used by read-only tooling.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically replace the file with the given pending set.
    ///
    /// Shots that are not pending are skipped; they never reach disk.
    pub fn save(&self, shots: &[ScheduledShot]) -> Result<()> {
        let records: BTreeMap<&str, StoredShot> = shots
            .iter()
            .filter(|s| s.status.is_pending())
            .map(|s| (s.id.as_str(), StoredShot::from(s)))
            .collect();
        let json = serde_json::to_string_pretty(&records)?;

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let temp_path = dir.join(format!(".{}.tmp.{}", self.file_name(), std::process::id()));

        let mut file = fs::File::create(&temp_path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }

        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &self.path)?;
        debug!(path = %self.path.display(), count = records.len(), "pending shots saved");
        Ok(())
    }

    /// Read the pending set. A missing file is an empty set; an unparsable
    /// file is quarantined next to the original and also yields an empty set.
    pub fn load(&self) -> Result<Vec<ScheduledShot>> {
        let Some(raw) = self.read_raw()? else {
            return Ok(Vec::new());
        };

        match parse(&raw) {
            Ok(shots) => {
                info!(path = %self.path.display(), count = shots.len(), "pending shots loaded");
                Ok(shots)
            }
            Err(e) => {
                warn!(path = %self.path.display(), "store file is corrupt: {e}");
                self.quarantine();
                Ok(Vec::new())
            }
        }
    }

    /// Parse the file without any side effects. Corruption is an error here.
    pub fn peek(&self) -> Result<Vec<ScheduledShot>> {
        match self.read_raw()? {
            Some(raw) => Ok(parse(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    fn read_raw(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Move the current file aside; never overwrites an earlier quarantine.
    fn quarantine(&self) {
        let mut target = self.sibling(&format!("{}.corrupt", self.file_name()));
        if target.exists() {
            let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
            target = self.sibling(&format!("{}.{stamp}.corrupt", self.file_name()));
        }
        match fs::rename(&self.path, &target) {
            Ok(()) => warn!(quarantined = %target.display(), "corrupt store file moved aside"),
            Err(e) => error!(path = %self.path.display(), "failed to quarantine corrupt store: {e}"),
        }
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn sibling(&self, name: &str) -> PathBuf {
        self.path.with_file_name(name)
    }
}

fn parse(raw: &str) -> serde_json::Result<Vec<ScheduledShot>> {
    let records: BTreeMap<String, StoredShot> = serde_json::from_str(raw)?;
    Ok(records
        .into_iter()
        .map(|(id, record)| record.into_shot(id))
        .collect())
}

fn is_writable(dir: &Path) -> bool {
    if fs::create_dir_all(dir).is_err() {
        return false;
    }
    let probe = dir.join(format!(".write-probe.{}", std::process::id()));
    match fs::File::create(&probe) {
        Ok(_) => {
            let _ = fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}
