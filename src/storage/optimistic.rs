//! Compare-and-swap emulation over stores without conditional writes.

use std::sync::Mutex;

use crate::alert::{Alert, AlertId};
use crate::driver::DriverId;
use crate::storage::traits::{AlertGuard, AlertStore, ConditionalWrite, RowAlertStore, StorageError};

/// Adapts a [`RowAlertStore`] into an [`AlertStore`].
///
/// `update_if` re-reads the row, compares it with the guard and writes only
/// on a match. The adapter mutex serializes read-compare-write within this
/// process. Writers in other processes are not covered; back ends that
/// offer a native conditional update should implement [`AlertStore`]
/// directly instead.
#[derive(Debug)]
pub struct OptimisticAlertStore<S> {
    inner: S,
    write_gate: Mutex<()>,
}

impl<S: RowAlertStore> OptimisticAlertStore<S> {
    /// Wraps `inner`.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            write_gate: Mutex::new(()),
        }
    }

    /// The wrapped row store.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: RowAlertStore> AlertStore for OptimisticAlertStore<S> {
    fn insert(&self, alert: Alert) -> Result<(), StorageError> {
        self.inner.insert_row(alert)
    }

    fn get(&self, id: AlertId) -> Result<Option<Alert>, StorageError> {
        self.inner.get_row(id)
    }

    fn update_if(&self, mut alert: Alert, guard: &AlertGuard) -> Result<ConditionalWrite, StorageError> {
        let _gate = self
            .write_gate
            .lock()
            .map_err(|_| StorageError::BackendError("poisoned lock: optimistic write gate".to_string()))?;

        let current = self
            .inner
            .get_row(alert.id)?
            .ok_or(StorageError::AlertNotFound(alert.id))?;

        if !guard.matches(&current) {
            tracing::debug!(alert_id = %alert.id, status = %current.status, "optimistic write rejected");
            return Ok(ConditionalWrite::Rejected { current });
        }

        alert.version = current.version + 1;
        self.inner.put_row(alert.clone())?;
        Ok(ConditionalWrite::Applied(alert))
    }

    fn find_by_driver(&self, driver: DriverId) -> Result<Vec<Alert>, StorageError> {
        self.inner.find_rows_by_driver(driver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Barrier};
    use std::thread;

    use chrono::Utc;

    use crate::alert::AlertStatus;
    use crate::dustbin::BinId;
    use crate::storage::InMemoryAlertStore;

    fn assigned(driver: DriverId) -> Alert {
        let now = Utc::now();
        let mut alert = Alert::pending(BinId::new("bin9").unwrap(), now);
        alert.status = AlertStatus::Assigned;
        alert.driver_id = Some(driver);
        alert.assigned_at = Some(now);
        alert
    }

    #[test]
    fn stale_guard_is_rejected() {
        let store = OptimisticAlertStore::new(InMemoryAlertStore::new());
        let alert = assigned(DriverId::new());
        store.insert(alert.clone()).unwrap();

        let mut stale = AlertGuard::of(&alert);
        stale.status = AlertStatus::Pending;
        let result = store.update_if(alert.clone(), &stale).unwrap();
        assert!(matches!(result, ConditionalWrite::Rejected { current } if current.version == 0));
    }

    #[test]
    fn concurrent_writers_one_wins() {
        let store = Arc::new(OptimisticAlertStore::new(InMemoryAlertStore::new()));
        let alert = assigned(DriverId::new());
        store.insert(alert.clone()).unwrap();
        let guard = AlertGuard::of(&alert);

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                let mut next = alert.clone();
                next.status = AlertStatus::Accepted;
                next.accepted_at = Some(Utc::now());
                thread::spawn(move || {
                    barrier.wait();
                    store.update_if(next, &guard).unwrap()
                })
            })
            .collect();

        let applied = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|w| matches!(w, ConditionalWrite::Applied(_)))
            .count();
        assert_eq!(applied, 1);
        assert_eq!(store.get(alert.id).unwrap().unwrap().version, 1);
    }
}
