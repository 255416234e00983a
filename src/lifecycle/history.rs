//! Completed-work audit entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::{Alert, AlertId, PhotoRef};
use crate::driver::DriverId;
use crate::dustbin::BinId;
use crate::time::whole_minutes;

/// One completed collection, written when an alert reaches `completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkHistoryEntry {
    pub alert_id: AlertId,
    pub driver_id: DriverId,
    pub bin_id: BinId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<PhotoRef>,

    pub accepted_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,

    /// `completed_at - accepted_at`, never negative.
    pub duration_secs: i64,
}

impl WorkHistoryEntry {
    /// Creates an entry; the duration is derived from the two stamps.
    #[must_use]
    pub fn new(
        alert_id: AlertId,
        driver_id: DriverId,
        bin_id: BinId,
        photo: Option<PhotoRef>,
        accepted_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            alert_id,
            driver_id,
            bin_id,
            photo,
            accepted_at,
            completed_at,
            duration_secs: (completed_at - accepted_at).num_seconds().max(0),
        }
    }

    /// Builds the entry for a completed alert. `None` unless the alert carries
    /// an assignee and both stamps.
    #[must_use]
    pub fn for_alert(alert: &Alert) -> Option<Self> {
        Some(Self::new(
            alert.id,
            alert.driver_id?,
            alert.bin_id.clone(),
            alert.photo.clone(),
            alert.accepted_at?,
            alert.completed_at?,
        ))
    }

    /// Duration rounded down to whole minutes.
    #[must_use]
    pub fn work_duration_minutes(&self) -> i64 {
        whole_minutes(chrono::Duration::seconds(self.duration_secs))
    }
}
