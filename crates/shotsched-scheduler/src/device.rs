use async_trait::async_trait;

/// Failure reported by a [`DeviceCommandClient`].
///
/// The display string is what ends up in a failed shot's `error` field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The device could not be reached (connect error, timeout, ...).
    #[error("device unavailable: {0}")]
    Unavailable(String),
    /// The device answered but refused the command.
    #[error("device rejected command: {0}")]
    Rejected(String),
}

/// The actuation capability the executor drives when a timer fires.
#[async_trait]
pub trait DeviceCommandClient: Send + Sync {
    /// Short identifier used in log lines.
    fn name(&self) -> &str {
        "device"
    }

    async fn preheat(&self) -> Result<(), DispatchError>;

    async fn run_profile(&self, profile_id: &str) -> Result<(), DispatchError>;
}
