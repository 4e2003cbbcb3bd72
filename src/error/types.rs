use thiserror::Error;

use crate::logging::LoggingError;

/// Unified result type for the drive simulation crate.
pub type Result<T> = std::result::Result<T, DriveError>;

/// Errors surfaced by the simulation core and its runtime.
#[derive(Debug, Error)]
pub enum DriveError {
    #[error("capability `{0}` not registered")]
    CapabilityNotFound(&'static str),
    #[error("capability `{0}` stored with a mismatched type")]
    CapabilityTypeMismatch(&'static str),
    #[error("state `{0}` not found")]
    StateNotFound(String),
    #[error("state `{state}` failed: {reason}")]
    StateFailure { state: String, reason: String },
    #[error("shared lock poisoned")]
    Poisoned,
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
    #[error("logging error: {0}")]
    Logging(#[from] LoggingError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DriveError {
    /// True for the lookup failures (capability or state) that are fatal to
    /// the calling operation.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DriveError::CapabilityNotFound(_) | DriveError::StateNotFound(_)
        )
    }

    pub fn state_failure(state: impl Into<String>, reason: impl Into<String>) -> Self {
        DriveError::StateFailure {
            state: state.into(),
            reason: reason.into(),
        }
    }
}
