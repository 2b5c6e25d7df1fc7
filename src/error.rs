//! Error types for punishment persistence
//!
//! Conflicts, missing revocation targets and cancelled events are not errors:
//! they surface as `Ok(None)` from the engines. Everything here is a genuine
//! failure the caller has to look at.

use thiserror::Error;

/// Errors that can occur while drafting, persisting or querying punishments
#[derive(Debug, Error)]
pub enum PunishmentError {
    /// A required field was missing or a value was malformed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The storage backend failed (connectivity, unexpected constraint, ...)
    #[error("Storage failure: {0}")]
    Storage(#[from] sqlx::Error),

    /// A stored row could not be decoded into the data model
    #[error("Corrupt punishment row: {0}")]
    Corrupt(String),

    /// Configuration could not be used to open the store
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PunishmentError {
    /// Create an invalid argument error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a corrupt row error
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt(message.into())
    }
}

/// Result type for punishment operations
pub type PunishmentResult<T> = Result<T, PunishmentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = PunishmentError::invalid("victim is required");
        assert_eq!(error.to_string(), "Invalid argument: victim is required");

        let error = PunishmentError::corrupt("unknown victim type 9");
        assert_eq!(error.to_string(), "Corrupt punishment row: unknown victim type 9");

        let error = PunishmentError::from(sqlx::Error::RowNotFound);
        assert!(error.to_string().starts_with("Storage failure"));
    }
}
