//! Driver identity, profile, and duty status.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BinwatchResult;
use crate::storage::{ProfileStore, StorageError};
use crate::time::Clock;

/// Stable driver identifier, issued by the external account system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverId(Uuid);

impl DriverId {
    /// Creates a new random driver ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a driver ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for DriverId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for DriverId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Driver profile row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverProfile {
    pub id: DriverId,

    pub full_name: String,

    /// Employer-issued staff number.
    pub id_number: String,

    #[serde(default)]
    pub phone_number: Option<String>,

    /// On duty and eligible for new alerts.
    #[serde(default)]
    pub is_working: bool,

    #[serde(default)]
    pub last_toggle_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub work_minutes_today: u32,
}

impl DriverProfile {
    /// Creates an off-duty profile.
    #[must_use]
    pub fn new(id: DriverId, full_name: impl Into<String>, id_number: impl Into<String>) -> Self {
        Self {
            id,
            full_name: full_name.into(),
            id_number: id_number.into(),
            phone_number: None,
            is_working: false,
            last_toggle_time: None,
            work_minutes_today: 0,
        }
    }
}

/// On-duty / on-break switch for drivers.
///
/// Drivers on break are skipped by the upstream assignment process; this
/// type only records the switch.
pub struct DutyRoster {
    profiles: Arc<dyn ProfileStore>,
    clock: Arc<dyn Clock>,
}

impl DutyRoster {
    /// Creates a roster backed by `profiles`.
    pub fn new(profiles: Arc<dyn ProfileStore>, clock: Arc<dyn Clock>) -> Self {
        Self { profiles, clock }
    }

    /// Turns duty on or off and records the toggle time.
    ///
    /// # Errors
    /// `PersistenceFailure` when the profile is missing or the store fails.
    pub fn set_on_duty(&self, driver: DriverId, on_duty: bool) -> BinwatchResult<DriverProfile> {
        let mut profile = self
            .profiles
            .get(driver)?
            .ok_or(StorageError::ProfileNotFound(driver))?;

        profile.is_working = on_duty;
        profile.last_toggle_time = Some(self.clock.now());
        self.profiles.upsert(profile.clone())?;

        tracing::info!(driver_id = %driver, on_duty, "duty status changed");
        Ok(profile)
    }

    /// Whether the driver is currently on duty. Unknown drivers are off duty.
    ///
    /// # Errors
    /// `PersistenceFailure` when the store fails.
    pub fn is_on_duty(&self, driver: DriverId) -> BinwatchResult<bool> {
        Ok(self.profiles.get(driver)?.is_some_and(|p| p.is_working))
    }
}
