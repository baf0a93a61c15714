use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_STORE_FILE: &str = "scheduled_shots.json";
pub const DEFAULT_PREHEAT_LEAD_SECS: u64 = 300;
pub const DEFAULT_JANITOR_INTERVAL_SECS: u64 = 300;
/// Terminal shots stay visible in memory for this long before eviction.
pub const RETENTION_WINDOW_SECS: u64 = 60 * 60;
pub const DEFAULT_DEVICE_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_DEVICE_TIMEOUT_SECS: u64 = 10;

/// Top-level config (shotsched.toml + SHOTSCHED_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShotschedConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub device: DeviceConfig,
}

/// Where pending shots are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Primary directory. Falls back to a temp directory when not writable.
    #[serde(default = "default_store_dir")]
    pub dir: String,
    #[serde(default = "default_store_file")]
    pub file_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
            file_name: default_store_file(),
        }
    }
}

impl StoreConfig {
    pub fn dir_path(&self) -> PathBuf {
        PathBuf::from(&self.dir)
    }
}

/// Timer and retention tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How long before the scheduled time a preheat is issued.
    #[serde(default = "default_preheat_lead_secs")]
    pub preheat_lead_secs: u64,
    /// Cadence of the retention sweep.
    #[serde(default = "default_janitor_interval_secs")]
    pub janitor_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            preheat_lead_secs: DEFAULT_PREHEAT_LEAD_SECS,
            janitor_interval_secs: DEFAULT_JANITOR_INTERVAL_SECS,
        }
    }
}

/// HTTP endpoint of the device that executes preheat / profile commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_device_url")]
    pub base_url: String,
    #[serde(default = "default_preheat_path")]
    pub preheat_path: String,
    /// `{profile_id}` is substituted with the (URL-safe) profile identifier.
    #[serde(default = "default_run_profile_path")]
    pub run_profile_path: String,
    #[serde(default = "default_device_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            base_url: default_device_url(),
            preheat_path: default_preheat_path(),
            run_profile_path: default_run_profile_path(),
            timeout_secs: DEFAULT_DEVICE_TIMEOUT_SECS,
        }
    }
}

fn default_store_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.shotsched", home)
}
fn default_store_file() -> String {
    DEFAULT_STORE_FILE.to_string()
}
fn default_preheat_lead_secs() -> u64 {
    DEFAULT_PREHEAT_LEAD_SECS
}
fn default_janitor_interval_secs() -> u64 {
    DEFAULT_JANITOR_INTERVAL_SECS
}
fn default_device_url() -> String {
    DEFAULT_DEVICE_URL.to_string()
}
fn default_preheat_path() -> String {
    "/api/v1/action/preheat".to_string()
}
fn default_run_profile_path() -> String {
    "/api/v1/profile/{profile_id}/run".to_string()
}
fn default_device_timeout_secs() -> u64 {
    DEFAULT_DEVICE_TIMEOUT_SECS
}

impl ShotschedConfig {
    /// Load config from a TOML file with SHOTSCHED_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `SHOTSCHED_SCHEDULER__PREHEAT_LEAD_SECS=120`.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.shotsched/shotsched.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("SHOTSCHED_").split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.shotsched/shotsched.toml", home)
}
