//! Domain events produced by edge detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::{Alert, AlertId};
use crate::driver::DriverId;
use crate::dustbin::{Bin, BinId};

/// A bin entered the `FULL` state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinFull {
    pub bin_id: BinId,
    pub bin_name: String,
    pub fill_level: u8,
    /// Sensor timestamp of the reading that crossed into `FULL`, if known.
    #[serde(default)]
    pub sensor_time: Option<DateTime<Utc>>,
}

impl BinFull {
    /// Event for `bin` as observed in a snapshot.
    #[must_use]
    pub fn from_bin(bin: &Bin) -> Self {
        Self {
            bin_id: bin.id.clone(),
            bin_name: bin.display_name().to_string(),
            fill_level: bin.fill_level,
            sensor_time: bin.last_sensor_update,
        }
    }
}

/// An alert entered the `assigned` state for a driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertAssigned {
    pub alert_id: AlertId,
    pub driver_id: DriverId,
    pub bin_id: BinId,
    #[serde(default)]
    pub distance_km: Option<f64>,
}

impl AlertAssigned {
    /// Event for `alert`; `None` if it has no assignee.
    #[must_use]
    pub fn from_alert(alert: &Alert) -> Option<Self> {
        Some(Self {
            alert_id: alert.id,
            driver_id: alert.driver_id?,
            bin_id: alert.bin_id.clone(),
            distance_km: alert.distance_km,
        })
    }
}

/// Everything the notification channels react to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    BinFull(BinFull),
    AlertAssigned(AlertAssigned),
}

impl From<BinFull> for DomainEvent {
    fn from(e: BinFull) -> Self {
        Self::BinFull(e)
    }
}

impl From<AlertAssigned> for DomainEvent {
    fn from(e: AlertAssigned) -> Self {
        Self::AlertAssigned(e)
    }
}
