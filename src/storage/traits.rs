//! Abstract storage traits for binwatch.
//!
//! These traits define the contract the relational store must honour.
//! By using traits, we enable:
//! - In-memory backends for tests, replays, and embedded use
//! - Remote row stores in production
//!
//! The one non-trivial requirement is [`AlertStore::update_if`]: a write
//! that applies only while the stored alert still matches the caller's view.

use thiserror::Error;

use crate::alert::{Alert, AlertId, AlertStatus};
use crate::driver::{DriverId, DriverProfile};
use crate::lifecycle::WorkHistoryEntry;
use crate::location::DriverLocationSample;
use crate::notify::PushToken;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Alert not found.
    #[error("Alert not found: {0}")]
    AlertNotFound(AlertId),

    /// Driver profile not found.
    #[error("Profile not found: {0}")]
    ProfileNotFound(DriverId),

    /// Key already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Connection failed.
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

impl StorageError {
    /// True for failures that say nothing about the data itself.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionError(_))
    }
}

/// The caller's view of an alert that a conditional write is predicated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertGuard {
    /// Status the caller read.
    pub status: AlertStatus,
    /// Assignee the caller read.
    pub driver_id: Option<DriverId>,
    /// Row version the caller read.
    pub version: u64,
}

impl AlertGuard {
    /// Guard matching exactly what `alert` holds.
    #[must_use]
    pub fn of(alert: &Alert) -> Self {
        Self {
            status: alert.status,
            driver_id: alert.driver_id,
            version: alert.version,
        }
    }

    /// True if `current` still matches the guarded view.
    #[must_use]
    pub fn matches(&self, current: &Alert) -> bool {
        current.status == self.status
            && current.driver_id == self.driver_id
            && current.version == self.version
    }
}

/// Result of a conditional write.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionalWrite {
    /// The guard held; the stored row (with its new version) is returned.
    Applied(Alert),
    /// The guard failed; nothing was written. The current row is returned.
    Rejected {
        /// Row as currently stored.
        current: Alert,
    },
}

/// Storage trait for alerts, with the conditional-write primitive.
///
/// # Safety Considerations
/// - `update_if` must compare and write atomically with respect to every
///   other writer of the same row
/// - Implementations must bump `version` on every applied write
pub trait AlertStore: Send + Sync {
    /// Insert a new alert. Returns error if ID already exists.
    fn insert(&self, alert: Alert) -> Result<(), StorageError>;

    /// Get an alert by ID.
    fn get(&self, id: AlertId) -> Result<Option<Alert>, StorageError>;

    /// Replace the alert only if the stored row still matches `guard`.
    ///
    /// # Errors
    /// - `AlertNotFound`: no row with `alert.id`
    fn update_if(&self, alert: Alert, guard: &AlertGuard) -> Result<ConditionalWrite, StorageError>;

    /// All alerts assigned to `driver`, any status.
    fn find_by_driver(&self, driver: DriverId) -> Result<Vec<Alert>, StorageError>;
}

/// Alert storage that only offers unconditional writes.
///
/// Wrap it in [`super::OptimisticAlertStore`] to obtain an [`AlertStore`].
pub trait RowAlertStore: Send + Sync {
    /// Insert a new alert. Returns error if ID already exists.
    fn insert_row(&self, alert: Alert) -> Result<(), StorageError>;

    /// Get an alert by ID.
    fn get_row(&self, id: AlertId) -> Result<Option<Alert>, StorageError>;

    /// Overwrite the stored alert unconditionally.
    fn put_row(&self, alert: Alert) -> Result<(), StorageError>;

    /// All alerts assigned to `driver`, any status.
    fn find_rows_by_driver(&self, driver: DriverId) -> Result<Vec<Alert>, StorageError>;
}

/// Storage trait for completed-work audit entries.
pub trait WorkHistoryStore: Send + Sync {
    /// Append an entry. Returns error if one already exists for the alert.
    fn append(&self, entry: WorkHistoryEntry) -> Result<(), StorageError>;

    /// The entry recorded for `alert`, if any.
    fn find_by_alert(&self, alert: AlertId) -> Result<Option<WorkHistoryEntry>, StorageError>;

    /// Most recent entries for `driver`, newest completion first.
    fn find_by_driver(&self, driver: DriverId, limit: usize) -> Result<Vec<WorkHistoryEntry>, StorageError>;
}

/// Append-only storage for driver position samples.
pub trait LocationStore: Send + Sync {
    /// Append a sample. Samples are never updated or deleted.
    fn append(&self, sample: DriverLocationSample) -> Result<(), StorageError>;

    /// Samples for `driver` in append order.
    fn find_by_driver(&self, driver: DriverId) -> Result<Vec<DriverLocationSample>, StorageError>;
}

/// Storage trait for driver profiles.
pub trait ProfileStore: Send + Sync {
    /// Get a profile by driver ID.
    fn get(&self, id: DriverId) -> Result<Option<DriverProfile>, StorageError>;

    /// Insert or replace a profile.
    fn upsert(&self, profile: DriverProfile) -> Result<(), StorageError>;
}

/// Local cache of the device push token, keyed by driver.
///
/// Advisory: implementations may lose entries at any time; callers
/// regenerate the token on the next registration.
pub trait PushTokenStore: Send + Sync {
    /// Store the token for its driver, overwriting any previous value.
    fn put(&self, token: PushToken) -> Result<(), StorageError>;

    /// The latest token for `driver`.
    fn get(&self, driver: DriverId) -> Result<Option<PushToken>, StorageError>;

    /// Forget the token for `driver`.
    fn clear(&self, driver: DriverId) -> Result<(), StorageError>;
}
