//! Alert records and their status lattice.
//!
//! An alert links a full bin to a driver and moves along
//! `pending → assigned → accepted → completed`, with `cancelled` reachable
//! from `pending` or `assigned`. Alerts are created by the upstream
//! assignment process, never by a driver's device.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::driver::DriverId;
use crate::dustbin::BinId;
use crate::error::ValidationError;

/// Unique identifier for an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(Uuid);

impl AlertId {
    /// Creates a new random alert ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for AlertId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    /// Raised, no driver chosen yet.
    Pending,
    /// A driver was chosen and notified.
    Assigned,
    /// The assigned driver took the job.
    Accepted,
    /// Collection done.
    Completed,
    /// Withdrawn before acceptance (timeout or reassignment).
    Cancelled,
}

impl AlertStatus {
    /// Assigned or accepted: work the driver still has to do.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Assigned | Self::Accepted)
    }

    /// Completed or cancelled: no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl Default for AlertStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Assigned => write!(f, "assigned"),
            Self::Accepted => write!(f, "accepted"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A legal edge of the alert lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertTransition {
    /// `pending → assigned`, performed upstream.
    Assign,
    /// `assigned → accepted`, performed by the assignee.
    Accept,
    /// `accepted → completed`, performed by the assignee.
    Complete,
    /// `pending | assigned → cancelled`, performed upstream.
    Cancel,
}

impl AlertTransition {
    /// States this transition may start from.
    #[must_use]
    pub const fn sources(self) -> &'static [AlertStatus] {
        match self {
            Self::Assign => &[AlertStatus::Pending],
            Self::Accept => &[AlertStatus::Assigned],
            Self::Complete => &[AlertStatus::Accepted],
            Self::Cancel => &[AlertStatus::Pending, AlertStatus::Assigned],
        }
    }

    /// State this transition ends in.
    #[must_use]
    pub const fn target(self) -> AlertStatus {
        match self {
            Self::Assign => AlertStatus::Assigned,
            Self::Accept => AlertStatus::Accepted,
            Self::Complete => AlertStatus::Completed,
            Self::Cancel => AlertStatus::Cancelled,
        }
    }

    /// True if the transition may start from `status`.
    #[must_use]
    pub fn allows_from(self, status: AlertStatus) -> bool {
        self.sources().contains(&status)
    }
}

impl fmt::Display for AlertTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assign => write!(f, "assign"),
            Self::Accept => write!(f, "accept"),
            Self::Complete => write!(f, "complete"),
            Self::Cancel => write!(f, "cancel"),
        }
    }
}

/// Reference to photographic evidence attached on completion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhotoRef(String);

impl PhotoRef {
    /// Wraps an opaque photo reference (typically an object-store URL).
    pub fn new(reference: impl Into<String>) -> Result<Self, ValidationError> {
        let reference = reference.into();
        if reference.trim().is_empty() {
            return Err(ValidationError::EmptyIdentifier { field: "photo" });
        }
        Ok(Self(reference))
    }

    /// Returns the raw reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A unit of work linking a full bin to a driver.
///
/// `version` increments on every persisted write and backs the conditional
/// update in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,

    pub bin_id: BinId,

    #[serde(default)]
    pub driver_id: Option<DriverId>,

    pub status: AlertStatus,

    /// Distance from the driver to the bin, computed upstream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<PhotoRef>,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub assigned_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub accepted_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub version: u64,
}

impl Alert {
    /// Creates a pending alert for `bin_id`.
    #[must_use]
    pub fn pending(bin_id: BinId, created_at: DateTime<Utc>) -> Self {
        Self {
            id: AlertId::new(),
            bin_id,
            driver_id: None,
            status: AlertStatus::Pending,
            distance_km: None,
            photo: None,
            created_at,
            assigned_at: None,
            accepted_at: None,
            completed_at: None,
            cancelled_at: None,
            version: 0,
        }
    }

    /// True if `driver` is the assignee.
    #[must_use]
    pub fn is_held_by(&self, driver: DriverId) -> bool {
        self.driver_id == Some(driver)
    }

    /// Latest timestamp reached so far.
    #[must_use]
    pub fn last_stamp(&self) -> DateTime<Utc> {
        [self.assigned_at, self.accepted_at, self.completed_at, self.cancelled_at]
            .into_iter()
            .flatten()
            .fold(self.created_at, std::cmp::max)
    }

    /// Checks timestamp monotonicity and that only reached states carry a stamp.
    ///
    /// # Errors
    /// The first violated rule, as a [`ValidationError`].
    pub fn check_invariants(&self) -> Result<(), ValidationError> {
        let status = self.status;

        let stamps = [
            ("assigned_at", self.assigned_at),
            ("accepted_at", self.accepted_at),
            ("completed_at", self.completed_at),
            ("cancelled_at", self.cancelled_at),
        ];
        // Indices into `stamps` that must be set / must be unset for each status.
        let (required, forbidden): (&[usize], &[usize]) = match status {
            AlertStatus::Pending => (&[], &[0, 1, 2, 3]),
            AlertStatus::Assigned => (&[0], &[1, 2, 3]),
            AlertStatus::Accepted => (&[0, 1], &[2, 3]),
            AlertStatus::Completed => (&[0, 1, 2], &[3]),
            AlertStatus::Cancelled => (&[3], &[1, 2]),
        };
        for &i in required {
            let (field, value) = stamps[i];
            if value.is_none() {
                return Err(ValidationError::MissingTimestamp { field, status });
            }
        }
        for &i in forbidden {
            let (field, value) = stamps[i];
            if value.is_some() {
                return Err(ValidationError::UnreachedTimestamp { field, status });
            }
        }

        if matches!(
            status,
            AlertStatus::Assigned | AlertStatus::Accepted | AlertStatus::Completed
        ) && self.driver_id.is_none()
        {
            return Err(ValidationError::MissingDriver { status });
        }

        let mut previous = ("created_at", self.created_at);
        let chain = [
            ("assigned_at", self.assigned_at),
            ("accepted_at", self.accepted_at),
            ("completed_at", self.completed_at),
        ];
        for (field, value) in chain {
            let Some(at) = value else { continue };
            if at < previous.1 {
                return Err(ValidationError::TimestampOrder {
                    earlier: previous.0,
                    earlier_at: previous.1,
                    later: field,
                    later_at: at,
                });
            }
            previous = (field, at);
        }

        if let Some(cancelled) = self.cancelled_at {
            let floor = self.assigned_at.map_or(("created_at", self.created_at), |a| ("assigned_at", a));
            if cancelled < floor.1 {
                return Err(ValidationError::TimestampOrder {
                    earlier: floor.0,
                    earlier_at: floor.1,
                    later: "cancelled_at",
                    later_at: cancelled,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn bin() -> BinId {
        BinId::new("bin-7").unwrap()
    }

    #[test]
    fn transition_edges() {
        assert!(AlertTransition::Accept.allows_from(AlertStatus::Assigned));
        assert!(!AlertTransition::Accept.allows_from(AlertStatus::Pending));
        assert!(AlertTransition::Cancel.allows_from(AlertStatus::Pending));
        assert!(AlertTransition::Cancel.allows_from(AlertStatus::Assigned));
        assert!(!AlertTransition::Cancel.allows_from(AlertStatus::Accepted));
        assert_eq!(AlertTransition::Complete.target(), AlertStatus::Completed);
    }

    #[test]
    fn status_predicates() {
        assert!(AlertStatus::Assigned.is_active());
        assert!(AlertStatus::Accepted.is_active());
        assert!(!AlertStatus::Completed.is_active());
        assert!(AlertStatus::Cancelled.is_terminal());
        assert!(!AlertStatus::Accepted.is_terminal());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&AlertStatus::Accepted).unwrap();
        assert_eq!(json, "\"accepted\"");
    }

    #[test]
    fn pending_alert_is_valid() {
        let alert = Alert::pending(bin(), Utc::now());
        assert!(alert.check_invariants().is_ok());
        assert_eq!(alert.last_stamp(), alert.created_at);
    }

    #[test]
    fn completed_alert_requires_all_prior_stamps() {
        let t0 = Utc::now();
        let mut alert = Alert::pending(bin(), t0);
        alert.driver_id = Some(DriverId::new());
        alert.status = AlertStatus::Completed;
        alert.assigned_at = Some(t0);
        alert.completed_at = Some(t0 + Duration::minutes(5));

        assert!(matches!(
            alert.check_invariants(),
            Err(ValidationError::MissingTimestamp { field: "accepted_at", .. })
        ));

        alert.accepted_at = Some(t0 + Duration::minutes(1));
        assert!(alert.check_invariants().is_ok());
    }

    #[test]
    fn out_of_order_stamps_rejected() {
        let t0 = Utc::now();
        let mut alert = Alert::pending(bin(), t0);
        alert.driver_id = Some(DriverId::new());
        alert.status = AlertStatus::Accepted;
        alert.assigned_at = Some(t0 + Duration::minutes(2));
        alert.accepted_at = Some(t0 + Duration::minutes(1));

        assert!(matches!(
            alert.check_invariants(),
            Err(ValidationError::TimestampOrder { later: "accepted_at", .. })
        ));
    }

    #[test]
    fn unreached_stamp_rejected() {
        let t0 = Utc::now();
        let mut alert = Alert::pending(bin(), t0);
        alert.accepted_at = Some(t0);
        assert!(matches!(
            alert.check_invariants(),
            Err(ValidationError::UnreachedTimestamp { field: "accepted_at", .. })
        ));
    }

    #[test]
    fn photo_ref_rejects_blank() {
        assert!(PhotoRef::new("").is_err());
        assert_eq!(PhotoRef::new("s3://p/1.jpg").unwrap().as_str(), "s3://p/1.jpg");
    }
}
