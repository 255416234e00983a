//! Edge detection over a driver's alert list.
//!
//! The relational store's change feed only says "something changed"; the
//! driver's alerts are re-fetched and diffed here so each assignment is
//! announced once.

use std::collections::HashMap;

use crate::alert::{Alert, AlertId, AlertStatus};

use super::events::AlertAssigned;

/// Emits [`AlertAssigned`] once when an alert enters `assigned`.
#[derive(Debug, Default, Clone)]
pub struct AlertWatcher {
    known: HashMap<AlertId, AlertStatus>,
}

impl AlertWatcher {
    /// Creates a watcher that has seen nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Diffs a freshly fetched alert list against what was seen before.
    pub fn observe(&mut self, alerts: &[Alert]) -> Vec<AlertAssigned> {
        let mut events = Vec::new();
        for alert in alerts {
            let previous = self.known.insert(alert.id, alert.status);
            if alert.status != AlertStatus::Assigned || previous == Some(AlertStatus::Assigned) {
                continue;
            }
            if let Some(event) = AlertAssigned::from_alert(alert) {
                tracing::debug!(alert_id = %alert.id, "alert newly assigned");
                events.push(event);
            }
        }
        events
    }

    /// Records the list without emitting events.
    pub fn seed(&mut self, alerts: &[Alert]) {
        for alert in alerts {
            self.known.insert(alert.id, alert.status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::driver::DriverId;
    use crate::dustbin::BinId;

    #[test]
    fn announces_each_assignment_once() {
        let mut watcher = AlertWatcher::new();
        let mut alert = Alert::pending(BinId::new("bin4").unwrap(), Utc::now());
        assert!(watcher.observe(std::slice::from_ref(&alert)).is_empty());

        alert.status = AlertStatus::Assigned;
        alert.driver_id = Some(DriverId::new());
        alert.distance_km = Some(2.25);
        let events = watcher.observe(std::slice::from_ref(&alert));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].distance_km, Some(2.25));

        assert!(watcher.observe(std::slice::from_ref(&alert)).is_empty());

        alert.status = AlertStatus::Accepted;
        assert!(watcher.observe(std::slice::from_ref(&alert)).is_empty());
    }

    #[test]
    fn seeded_alerts_are_quiet() {
        let mut watcher = AlertWatcher::new();
        let mut alert = Alert::pending(BinId::new("bin4").unwrap(), Utc::now());
        alert.status = AlertStatus::Assigned;
        alert.driver_id = Some(DriverId::new());

        watcher.seed(std::slice::from_ref(&alert));
        assert!(watcher.observe(&[alert]).is_empty());
    }
}
