//! `shotsched-core`: configuration shared by the scheduler and the daemon.

pub mod config;
pub mod error;

pub use config::ShotschedConfig;
pub use error::{CoreError, Result};
