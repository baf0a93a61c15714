//! `shotsched-scheduler`: durable scheduler for future device actuations.
//!
//! # Overview
//!
//! A [`ScheduledShot`] asks the device to preheat and/or run a profile at a
//! wall-clock instant. Pending shots are persisted to a single JSON file by
//! [`store::ShotStore`] so they survive restarts. The [`ShotScheduler`]
//! facade ties the pieces together:
//!
//! | Component  | Role                                                      |
//! |------------|-----------------------------------------------------------|
//! | `Registry` | In-memory map of every shot, state machine, store writes  |
//! | `Executor` | One cancellable wake-up task per pending shot             |
//! | `restore`  | On start: reload the store, fail expired, re-arm the rest |
//! | `Janitor`  | Evict finished shots after the one-hour retention window  |
//!
//! The device itself is reached through the [`DeviceCommandClient`] trait and
//! time through the [`Clock`] trait, so both can be faked in tests.

pub mod clock;
pub mod device;
pub mod engine;
pub mod error;
pub mod executor;
pub mod janitor;
pub mod registry;
pub mod restorer;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use device::{DeviceCommandClient, DispatchError};
pub use engine::ShotScheduler;
pub use error::{Result, SchedulerError};
pub use restorer::RestoreReport;
pub use store::ShotStore;
pub use types::{ScheduledShot, ShotId, ShotStatus};
