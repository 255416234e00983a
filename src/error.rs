//! Error types for binwatch.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! the specific condition (a stale transition is handled very differently
//! from a store outage) and still get a readable message.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::alert::{AlertId, AlertStatus, AlertTransition};
use crate::host::Permission;
use crate::storage::StorageError;

/// Validation errors raised when a record violates its own invariants.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Fill level {value} is out of range [0, 100]")]
    FillLevelOutOfRange {
        value: i64,
    },

    #[error("Coordinate ({latitude}, {longitude}) is out of range")]
    CoordinateOutOfRange {
        latitude: f64,
        longitude: f64,
    },

    #[error("Identifier '{field}' cannot be empty")]
    EmptyIdentifier {
        field: &'static str,
    },

    #[error("Timestamp '{later}' ({later_at}) precedes '{earlier}' ({earlier_at})")]
    TimestampOrder {
        earlier: &'static str,
        earlier_at: DateTime<Utc>,
        later: &'static str,
        later_at: DateTime<Utc>,
    },

    #[error("Timestamp '{field}' is set but status {status} has not reached it")]
    UnreachedTimestamp {
        field: &'static str,
        status: AlertStatus,
    },

    #[error("Timestamp '{field}' is required for status {status}")]
    MissingTimestamp {
        field: &'static str,
        status: AlertStatus,
    },

    #[error("Alert in status {status} must reference a driver")]
    MissingDriver {
        status: AlertStatus,
    },
}

/// Failures reported by host-environment collaborators.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Failed to render notification: {message}")]
    RenderFailed {
        message: String,
    },

    #[error("Failed to play alert sound: {message}")]
    SoundFailed {
        message: String,
    },

    #[error("Push provider failed to issue a token: {message}")]
    TokenUnavailable {
        message: String,
    },

    #[error("Position source failed: {message}")]
    PositionUnavailable {
        message: String,
    },
}

/// Top-level error type for binwatch.
#[derive(Debug, Error)]
pub enum BinwatchError {
    /// Notification or location permission is not granted. Non-fatal: the
    /// dependent feature stays disabled until permission changes externally.
    #[error("Permission denied: {permission}")]
    PermissionDenied {
        permission: Permission,
    },

    /// The persisted alert no longer matches the state the transition expects.
    /// Nothing was written; re-fetch before deciding whether to try again.
    #[error("Stale transition '{transition}' on alert {alert_id}: expected {expected}, found {actual} ({detail})")]
    StaleTransition {
        alert_id: AlertId,
        transition: AlertTransition,
        expected: AlertStatus,
        actual: AlertStatus,
        detail: String,
    },

    #[error("Alert not found: {id}")]
    AlertNotFound {
        id: AlertId,
    },

    /// Network or store failure on read or write. Never retried automatically.
    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[from] StorageError),

    /// A push message could not be interpreted. Receivers degrade to defaults.
    #[error("Malformed push payload: {reason}")]
    MalformedPushPayload {
        reason: String,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Host error: {0}")]
    Host(#[from] HostError),

    /// A worker channel closed underneath the caller.
    #[error("Channel disconnected: {path}")]
    Disconnected {
        path: String,
    },

    #[error("Timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Invalid configuration ({}): {reason}", .path.display())]
    Config {
        path: PathBuf,
        reason: String,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl BinwatchError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if a concurrent change invalidated the transition.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::StaleTransition { .. })
    }

    /// Returns true if a host permission is missing.
    #[must_use]
    pub const fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }

    /// Returns true if the store failed.
    #[must_use]
    pub const fn is_persistence(&self) -> bool {
        matches!(self, Self::PersistenceFailure(_))
    }

    /// Returns true if re-invoking the same call unchanged may succeed.
    ///
    /// A stale transition is deliberately not retryable: the caller has to
    /// re-read the alert first or it could overrule another driver's accept.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::PersistenceFailure(e) => e.is_transient(),
            Self::Host(HostError::PositionUnavailable { .. }) => true,
            _ => false,
        }
    }
}

/// Result type alias for binwatch operations.
pub type BinwatchResult<T> = Result<T, BinwatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_fill_level() {
        let err = ValidationError::FillLevelOutOfRange { value: 140 };
        let msg = format!("{err}");
        assert!(msg.contains("140"));
        assert!(msg.contains("out of range"));
    }

    #[test]
    fn test_stale_transition_message() {
        let err = BinwatchError::StaleTransition {
            alert_id: AlertId::new(),
            transition: AlertTransition::Accept,
            expected: AlertStatus::Assigned,
            actual: AlertStatus::Cancelled,
            detail: "status changed".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("accept"));
        assert!(msg.contains("assigned"));
        assert!(msg.contains("cancelled"));
        assert!(err.is_stale());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_permission_denied() {
        let err = BinwatchError::PermissionDenied {
            permission: Permission::Location,
        };
        assert!(err.is_permission_denied());
        assert!(format!("{err}").contains("location"));
    }

    #[test]
    fn test_persistence_from_storage() {
        let err: BinwatchError = StorageError::ConnectionError("reset by peer".to_string()).into();
        assert!(err.is_persistence());
        assert!(err.is_retryable());

        let err: BinwatchError = StorageError::BackendError("constraint".to_string()).into();
        assert!(err.is_persistence());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_internal_error() {
        let err = BinwatchError::internal("unexpected state");
        assert!(!err.is_retryable());
        assert!(format!("{err}").contains("unexpected state"));
    }
}
