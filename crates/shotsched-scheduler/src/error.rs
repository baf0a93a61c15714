use thiserror::Error;

use crate::types::ShotStatus;

/// Errors returned synchronously by scheduler operations.
///
/// Dispatch failures never surface here; they are recorded on the shot
/// itself (see [`crate::device::DispatchError`]).
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Malformed or under-specified creation request.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// No shot with the given ID is known to the registry.
    #[error("Shot not found: {id}")]
    NotFound { id: String },

    /// The shot's current status does not allow the requested operation.
    #[error("Shot {id} is {status}; operation not allowed")]
    InvalidState { id: String, status: ShotStatus },

    /// Reading or writing the durable store failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] std::io::Error),

    /// The store contents could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// `create` / `cancel` were called before `start` or after `stop`.
    #[error("Scheduler is not running")]
    NotStarted,
}

impl SchedulerError {
    /// Short error code string for the caller-facing surface.
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::Validation(_) => "VALIDATION_ERROR",
            SchedulerError::NotFound { .. } => "NOT_FOUND",
            SchedulerError::InvalidState { .. } => "INVALID_STATE",
            SchedulerError::Persistence(_) => "PERSISTENCE_ERROR",
            SchedulerError::Serialization(_) => "SERIALIZATION_ERROR",
            SchedulerError::NotStarted => "NOT_STARTED",
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
