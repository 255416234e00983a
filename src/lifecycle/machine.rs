//! Guarded alert transitions.
//!
//! Every transition reads the persisted alert, checks that the caller's
//! intent is still legal, and writes through [`AlertStore::update_if`] with
//! the exact row it read as the guard. Two writers racing on one alert
//! therefore cannot both succeed: the loser's guard no longer matches and it
//! observes [`BinwatchError::StaleTransition`] without mutating anything.
//!
//! Repeating a transition that already took effect for the same actor is
//! reported as [`TransitionOutcome::AlreadyApplied`] rather than an error,
//! so a double tap or a retry after a lost response is harmless.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::alert::{Alert, AlertId, AlertStatus, AlertTransition, PhotoRef};
use crate::driver::DriverId;
use crate::dustbin::BinId;
use crate::error::{BinwatchError, BinwatchResult};
use crate::lifecycle::history::WorkHistoryEntry;
use crate::storage::{AlertGuard, AlertStore, ConditionalWrite, StorageError, WorkHistoryStore};
use crate::time::{stamp_after, Clock};

/// Result of a transition request.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// This call performed the write.
    Applied(Alert),
    /// The alert was already in the requested state for this actor.
    AlreadyApplied(Alert),
}

impl TransitionOutcome {
    /// The alert as persisted after the call.
    #[must_use]
    pub fn alert(&self) -> &Alert {
        match self {
            Self::Applied(a) | Self::AlreadyApplied(a) => a,
        }
    }

    /// Consumes the outcome, returning the alert.
    #[must_use]
    pub fn into_alert(self) -> Alert {
        match self {
            Self::Applied(a) | Self::AlreadyApplied(a) => a,
        }
    }

    /// True if this call performed the write.
    #[must_use]
    pub const fn was_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Which of a driver's alerts to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertView {
    /// Assigned or accepted.
    Active,
    Completed,
    /// Everything assigned to the driver, any status.
    All,
}

impl AlertView {
    /// True if an alert in `status` belongs in this view.
    #[must_use]
    pub const fn includes(self, status: AlertStatus) -> bool {
        match self {
            Self::Active => status.is_active(),
            Self::Completed => matches!(status, AlertStatus::Completed),
            Self::All => true,
        }
    }
}

/// Owner of every alert status transition this system performs.
pub struct AlertStateMachine {
    alerts: Arc<dyn AlertStore>,
    history: Arc<dyn WorkHistoryStore>,
    clock: Arc<dyn Clock>,
}

impl AlertStateMachine {
    /// Creates a state machine over the given stores.
    pub fn new(
        alerts: Arc<dyn AlertStore>,
        history: Arc<dyn WorkHistoryStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { alerts, history, clock }
    }

    /// Raises a `pending` alert for a bin.
    ///
    /// Used by the upstream assignment process; drivers never create alerts.
    ///
    /// # Errors
    /// `PersistenceFailure` if the store rejects the insert.
    pub fn open(&self, bin_id: BinId) -> BinwatchResult<Alert> {
        let alert = Alert::pending(bin_id, self.clock.now());
        self.alerts.insert(alert.clone())?;
        tracing::info!(alert_id = %alert.id, bin_id = %alert.bin_id, "alert opened");
        Ok(alert)
    }

    /// Reads one alert.
    ///
    /// # Errors
    /// `AlertNotFound` or `PersistenceFailure`.
    pub fn get(&self, id: AlertId) -> BinwatchResult<Alert> {
        self.alerts.get(id)?.ok_or(BinwatchError::AlertNotFound { id })
    }

    /// `pending → assigned`. Re-assigning to the same driver is a no-op.
    ///
    /// # Errors
    /// - `StaleTransition`: the alert is no longer pending
    /// - `AlertNotFound`, `PersistenceFailure`
    pub fn assign(
        &self,
        id: AlertId,
        driver: DriverId,
        distance_km: Option<f64>,
    ) -> BinwatchResult<TransitionOutcome> {
        self.transition(id, AlertTransition::Assign, Some(driver), |alert, at| {
            alert.driver_id = Some(driver);
            alert.distance_km = distance_km;
            alert.assigned_at = Some(at);
        })
    }

    /// `assigned → accepted`, by the assignee only.
    ///
    /// # Errors
    /// - `StaleTransition`: the alert left `assigned` (for example it was
    ///   cancelled or reassigned) or is held by another driver
    /// - `AlertNotFound`, `PersistenceFailure`
    pub fn accept(&self, id: AlertId, driver: DriverId) -> BinwatchResult<TransitionOutcome> {
        self.transition(id, AlertTransition::Accept, Some(driver), |alert, at| {
            alert.accepted_at = Some(at);
        })
    }

    /// `accepted → completed`, by the assignee only, and records the work
    /// history entry.
    ///
    /// If the alert write succeeds but the history append fails, the error is
    /// returned; calling `complete` again yields `AlreadyApplied` and writes
    /// the missing entry.
    ///
    /// # Errors
    /// - `StaleTransition`: the alert is not `accepted` or is held by another driver
    /// - `AlertNotFound`, `PersistenceFailure`
    pub fn complete(
        &self,
        id: AlertId,
        driver: DriverId,
        photo: Option<PhotoRef>,
    ) -> BinwatchResult<TransitionOutcome> {
        let outcome = self.transition(id, AlertTransition::Complete, Some(driver), |alert, at| {
            alert.completed_at = Some(at);
            alert.photo = photo;
        })?;
        self.record_history(outcome.alert())?;
        Ok(outcome)
    }

    /// `pending | assigned → cancelled`.
    ///
    /// # Errors
    /// - `StaleTransition`: the alert was already accepted or completed
    /// - `AlertNotFound`, `PersistenceFailure`
    pub fn cancel(&self, id: AlertId) -> BinwatchResult<TransitionOutcome> {
        self.transition(id, AlertTransition::Cancel, None, |alert, at| {
            alert.cancelled_at = Some(at);
        })
    }

    /// A driver's alerts in `view`, newest first.
    ///
    /// # Errors
    /// `PersistenceFailure`.
    pub fn alerts_for(&self, driver: DriverId, view: AlertView) -> BinwatchResult<Vec<Alert>> {
        let mut alerts: Vec<Alert> = self
            .alerts
            .find_by_driver(driver)?
            .into_iter()
            .filter(|a| view.includes(a.status))
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(alerts)
    }

    /// A driver's most recent completed work, newest first.
    ///
    /// # Errors
    /// `PersistenceFailure`.
    pub fn work_history(&self, driver: DriverId, limit: usize) -> BinwatchResult<Vec<WorkHistoryEntry>> {
        let mut entries = self.history.find_by_driver(driver, limit)?;
        entries.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        entries.truncate(limit);
        Ok(entries)
    }

    fn transition(
        &self,
        id: AlertId,
        transition: AlertTransition,
        actor: Option<DriverId>,
        apply: impl FnOnce(&mut Alert, DateTime<Utc>),
    ) -> BinwatchResult<TransitionOutcome> {
        let current = self.get(id)?;

        if already_applied(&current, transition, actor) {
            tracing::debug!(alert_id = %id, %transition, "transition already applied");
            return Ok(TransitionOutcome::AlreadyApplied(current));
        }
        check_legal(&current, transition, actor)?;

        let at = stamp_after(self.clock.now(), Some(current.last_stamp()));
        let mut next = current.clone();
        next.status = transition.target();
        apply(&mut next, at);
        next.check_invariants()?;

        let guard = AlertGuard::of(&current);
        let write = self
            .alerts
            .update_if(next, &guard)
            .map_err(|e| match e {
                StorageError::AlertNotFound(id) => BinwatchError::AlertNotFound { id },
                other => BinwatchError::PersistenceFailure(other),
            })?;

        match write {
            ConditionalWrite::Applied(alert) => {
                tracing::info!(
                    alert_id = %id,
                    %transition,
                    status = %alert.status,
                    driver_id = ?alert.driver_id,
                    "alert transition applied"
                );
                Ok(TransitionOutcome::Applied(alert))
            }
            ConditionalWrite::Rejected { current } => {
                // Lost a race. A concurrent write by the same actor to the same
                // target counts as done; anything else is stale.
                if already_applied(&current, transition, actor) {
                    return Ok(TransitionOutcome::AlreadyApplied(current));
                }
                tracing::warn!(
                    alert_id = %id,
                    %transition,
                    actual = %current.status,
                    read_version = guard.version,
                    version = current.version,
                    "alert changed underneath transition"
                );
                let detail = if current.status == guard.status && current.driver_id == guard.driver_id {
                    format!("row version moved from {} to {}", guard.version, current.version)
                } else {
                    format!("row changed at version {}", current.version)
                };
                Err(stale(&current, transition, detail))
            }
        }
    }

    fn record_history(&self, alert: &Alert) -> BinwatchResult<()> {
        if self.history.find_by_alert(alert.id)?.is_some() {
            return Ok(());
        }
        let Some(entry) = WorkHistoryEntry::for_alert(alert) else {
            return Err(BinwatchError::internal(format!(
                "completed alert {} lacks assignee or stamps",
                alert.id
            )));
        };
        match self.history.append(entry) {
            Ok(()) | Err(StorageError::DuplicateKey(_)) => Ok(()),
            Err(e) => {
                tracing::error!(alert_id = %alert.id, error = %e, "work history append failed");
                Err(e.into())
            }
        }
    }
}

fn already_applied(current: &Alert, transition: AlertTransition, actor: Option<DriverId>) -> bool {
    current.status == transition.target() && actor.map_or(true, |d| current.is_held_by(d))
}

fn check_legal(current: &Alert, transition: AlertTransition, actor: Option<DriverId>) -> BinwatchResult<()> {
    if !transition.allows_from(current.status) {
        let detail = if current.status.is_terminal() {
            "alert is already closed"
        } else {
            "status does not allow transition"
        };
        return Err(stale(current, transition, detail.to_string()));
    }
    if !matches!(transition, AlertTransition::Accept | AlertTransition::Complete) {
        return Ok(());
    }
    match actor {
        Some(driver) if !current.is_held_by(driver) => {
            tracing::warn!(alert_id = %current.id, driver_id = %driver, %transition, "driver does not hold alert");
            Err(stale(current, transition, "held by another driver".to_string()))
        }
        _ => Ok(()),
    }
}

fn stale(current: &Alert, transition: AlertTransition, detail: String) -> BinwatchError {
    let expected = if transition.allows_from(current.status) {
        current.status
    } else {
        transition.sources()[0]
    };
    BinwatchError::StaleTransition {
        alert_id: current.id,
        transition,
        expected,
        actual: current.status,
        detail,
    }
}
