//! Error types for the enforcement system
//!
//! Enforcement is best-effort: these errors are logged by the engines and
//! never undo a committed punishment.

use thiserror::Error;

use crate::model::PunishmentType;

/// Errors that can occur during enforcement operations
#[derive(Debug, Error)]
pub enum EnforcementError {
    /// No handler registered for a punishment type
    #[error("No handler registered for {0}")]
    NoHandler(PunishmentType),

    /// Other servers could not be reached
    #[error("Broadcast failed: {0}")]
    Broadcast(String),

    /// A live connection could not be acted on
    #[error("Connection error: {0}")]
    Connection(String),

    /// The enforcement task is not running
    #[error("Enforcement task channel closed")]
    ChannelClosed,

    /// Generic error
    #[error("Enforcement error: {0}")]
    Other(String),
}

/// Convert a string into an `EnforcementError`
impl From<String> for EnforcementError {
    fn from(message: String) -> Self {
        Self::Other(message)
    }
}

/// Result type for enforcement operations
pub type EnforcementResult<T> = Result<T, EnforcementError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = EnforcementError::NoHandler(PunishmentType::Mute);
        assert_eq!(error.to_string(), "No handler registered for mute");

        let error = EnforcementError::ChannelClosed;
        assert_eq!(error.to_string(), "Enforcement task channel closed");

        let error = EnforcementError::from("Something went wrong".to_string());
        assert_eq!(error.to_string(), "Enforcement error: Something went wrong");
    }
}
