//! In-memory storage backend.
//!
//! This module provides thread-safe in-memory implementations of the storage traits.
//! It is intended for embedded usage, tests, replays, and as a reference implementation
//! of the conditional-write contract.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::alert::{Alert, AlertId};
use crate::driver::{DriverId, DriverProfile};
use crate::lifecycle::WorkHistoryEntry;
use crate::location::DriverLocationSample;
use crate::notify::PushToken;
use crate::storage::traits::{
    AlertGuard, AlertStore, ConditionalWrite, LocationStore, ProfileStore, PushTokenStore,
    RowAlertStore, StorageError, WorkHistoryStore,
};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

#[derive(Debug, Default)]
struct AlertState {
    by_id: HashMap<AlertId, Alert>,
    by_driver: HashMap<DriverId, HashSet<AlertId>>,
}

impl AlertState {
    fn index(&mut self, alert: &Alert) {
        if let Some(driver) = alert.driver_id {
            self.by_driver.entry(driver).or_default().insert(alert.id);
        }
    }

    fn unindex(&mut self, alert: &Alert) {
        let Some(driver) = alert.driver_id else { return };
        if let Some(set) = self.by_driver.get_mut(&driver) {
            set.remove(&alert.id);
            if set.is_empty() {
                self.by_driver.remove(&driver);
            }
        }
    }

    fn replace(&mut self, alert: Alert) {
        if let Some(old) = self.by_id.get(&alert.id).cloned() {
            self.unindex(&old);
        }
        self.index(&alert);
        self.by_id.insert(alert.id, alert);
    }

    fn insert_new(&mut self, alert: Alert) -> Result<(), StorageError> {
        if self.by_id.contains_key(&alert.id) {
            return Err(StorageError::DuplicateKey(alert.id.to_string()));
        }
        self.index(&alert);
        self.by_id.insert(alert.id, alert);
        Ok(())
    }

    fn for_driver(&self, driver: DriverId) -> Vec<Alert> {
        let mut out: Vec<Alert> = self
            .by_driver
            .get(&driver)
            .into_iter()
            .flatten()
            .filter_map(|id| self.by_id.get(id).cloned())
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        out
    }
}

/// In-memory alert store.
///
/// Implements both [`AlertStore`] (native conditional write under one lock)
/// and [`RowAlertStore`] (plain reads/writes), so it can also stand in for a
/// remote row store behind [`super::OptimisticAlertStore`].
#[derive(Debug, Default)]
pub struct InMemoryAlertStore {
    state: RwLock<AlertState>,
}

impl InMemoryAlertStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored alerts.
    ///
    /// # Errors
    /// `BackendError` if the lock is poisoned.
    pub fn len(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("alert store read"))?;
        Ok(state.by_id.len())
    }

    /// True if the store holds no alerts.
    ///
    /// # Errors
    /// `BackendError` if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

impl AlertStore for InMemoryAlertStore {
    fn insert(&self, alert: Alert) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("alert store write"))?;
        state.insert_new(alert)
    }

    fn get(&self, id: AlertId) -> Result<Option<Alert>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("alert store read"))?;
        Ok(state.by_id.get(&id).cloned())
    }

    fn update_if(&self, mut alert: Alert, guard: &AlertGuard) -> Result<ConditionalWrite, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("alert store write"))?;
        let current = state
            .by_id
            .get(&alert.id)
            .cloned()
            .ok_or(StorageError::AlertNotFound(alert.id))?;

        if !guard.matches(&current) {
            return Ok(ConditionalWrite::Rejected { current });
        }

        alert.version = current.version + 1;
        state.replace(alert.clone());
        Ok(ConditionalWrite::Applied(alert))
    }

    fn find_by_driver(&self, driver: DriverId) -> Result<Vec<Alert>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("alert store read"))?;
        Ok(state.for_driver(driver))
    }
}

impl RowAlertStore for InMemoryAlertStore {
    fn insert_row(&self, alert: Alert) -> Result<(), StorageError> {
        AlertStore::insert(self, alert)
    }

    fn get_row(&self, id: AlertId) -> Result<Option<Alert>, StorageError> {
        AlertStore::get(self, id)
    }

    fn put_row(&self, alert: Alert) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("alert store write"))?;
        if !state.by_id.contains_key(&alert.id) {
            return Err(StorageError::AlertNotFound(alert.id));
        }
        state.replace(alert);
        Ok(())
    }

    fn find_rows_by_driver(&self, driver: DriverId) -> Result<Vec<Alert>, StorageError> {
        AlertStore::find_by_driver(self, driver)
    }
}

#[derive(Debug, Default)]
struct HistoryState {
    by_alert: HashMap<AlertId, WorkHistoryEntry>,
    by_driver: HashMap<DriverId, Vec<AlertId>>,
}

/// In-memory work-history store.
#[derive(Debug, Default)]
pub struct InMemoryWorkHistoryStore {
    state: RwLock<HistoryState>,
}

impl InMemoryWorkHistoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkHistoryStore for InMemoryWorkHistoryStore {
    fn append(&self, entry: WorkHistoryEntry) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("history store write"))?;
        if state.by_alert.contains_key(&entry.alert_id) {
            return Err(StorageError::DuplicateKey(format!("work history for alert {}", entry.alert_id)));
        }
        state.by_driver.entry(entry.driver_id).or_default().push(entry.alert_id);
        state.by_alert.insert(entry.alert_id, entry);
        Ok(())
    }

    fn find_by_alert(&self, alert: AlertId) -> Result<Option<WorkHistoryEntry>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("history store read"))?;
        Ok(state.by_alert.get(&alert).cloned())
    }

    fn find_by_driver(&self, driver: DriverId, limit: usize) -> Result<Vec<WorkHistoryEntry>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("history store read"))?;
        let mut out: Vec<WorkHistoryEntry> = state
            .by_driver
            .get(&driver)
            .into_iter()
            .flatten()
            .filter_map(|id| state.by_alert.get(id).cloned())
            .collect();
        out.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        out.truncate(limit);
        Ok(out)
    }
}

/// In-memory, append-only location sample store.
#[derive(Debug, Default)]
pub struct InMemoryLocationStore {
    samples: RwLock<BTreeMap<DriverId, Vec<DriverLocationSample>>>,
}

impl InMemoryLocationStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocationStore for InMemoryLocationStore {
    fn append(&self, sample: DriverLocationSample) -> Result<(), StorageError> {
        let mut samples = self.samples.write().map_err(|_| lock_err("location store write"))?;
        samples.entry(sample.driver_id).or_default().push(sample);
        Ok(())
    }

    fn find_by_driver(&self, driver: DriverId) -> Result<Vec<DriverLocationSample>, StorageError> {
        let samples = self.samples.read().map_err(|_| lock_err("location store read"))?;
        Ok(samples.get(&driver).cloned().unwrap_or_default())
    }
}

/// In-memory driver profile store.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<DriverId, DriverProfile>>,
}

impl InMemoryProfileStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileStore for InMemoryProfileStore {
    fn get(&self, id: DriverId) -> Result<Option<DriverProfile>, StorageError> {
        let profiles = self.profiles.read().map_err(|_| lock_err("profile store read"))?;
        Ok(profiles.get(&id).cloned())
    }

    fn upsert(&self, profile: DriverProfile) -> Result<(), StorageError> {
        let mut profiles = self.profiles.write().map_err(|_| lock_err("profile store write"))?;
        profiles.insert(profile.id, profile);
        Ok(())
    }
}

/// In-memory push-token cache. Lost on restart, which the contract allows.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    tokens: RwLock<HashMap<DriverId, PushToken>>,
}

impl InMemoryTokenStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PushTokenStore for InMemoryTokenStore {
    fn put(&self, token: PushToken) -> Result<(), StorageError> {
        let mut tokens = self.tokens.write().map_err(|_| lock_err("token store write"))?;
        tokens.insert(token.driver_id, token);
        Ok(())
    }

    fn get(&self, driver: DriverId) -> Result<Option<PushToken>, StorageError> {
        let tokens = self.tokens.read().map_err(|_| lock_err("token store read"))?;
        Ok(tokens.get(&driver).cloned())
    }

    fn clear(&self, driver: DriverId) -> Result<(), StorageError> {
        let mut tokens = self.tokens.write().map_err(|_| lock_err("token store write"))?;
        tokens.remove(&driver);
        Ok(())
    }
}

/// Convenience bundle of in-memory stores.
///
/// Fields are `Arc`s so they can be handed to components as trait objects
/// while the caller keeps a typed handle for inspection.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStores {
    /// Alert store.
    pub alerts: Arc<InMemoryAlertStore>,
    /// Work-history store.
    pub history: Arc<InMemoryWorkHistoryStore>,
    /// Location sample store.
    pub locations: Arc<InMemoryLocationStore>,
    /// Driver profile store.
    pub profiles: Arc<InMemoryProfileStore>,
    /// Push-token cache.
    pub tokens: Arc<InMemoryTokenStore>,
}

impl InMemoryStores {
    /// Create a new bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, Utc};

    use crate::alert::AlertStatus;
    use crate::dustbin::BinId;
    use crate::geo::GeoPoint;

    fn assigned(driver: DriverId) -> Alert {
        let now = Utc::now();
        let mut alert = Alert::pending(BinId::new("bin1").unwrap(), now);
        alert.status = AlertStatus::Assigned;
        alert.driver_id = Some(driver);
        alert.assigned_at = Some(now);
        alert
    }

    #[test]
    fn alert_insert_get_and_duplicate() {
        let store = InMemoryAlertStore::new();
        let alert = assigned(DriverId::new());
        let id = alert.id;

        AlertStore::insert(&store, alert.clone()).unwrap();
        assert!(matches!(
            AlertStore::insert(&store, alert.clone()),
            Err(StorageError::DuplicateKey(_))
        ));
        assert_eq!(AlertStore::get(&store, id).unwrap(), Some(alert));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn update_if_applies_and_bumps_version() {
        let store = InMemoryAlertStore::new();
        let driver = DriverId::new();
        let alert = assigned(driver);
        AlertStore::insert(&store, alert.clone()).unwrap();

        let guard = AlertGuard::of(&alert);
        let mut next = alert.clone();
        next.status = AlertStatus::Accepted;
        next.accepted_at = Some(Utc::now());

        let ConditionalWrite::Applied(stored) = store.update_if(next.clone(), &guard).unwrap() else {
            panic!("expected applied write");
        };
        assert_eq!(stored.version, 1);
        assert_eq!(stored.status, AlertStatus::Accepted);

        // Same guard again: the row moved on, so the write is rejected untouched.
        let ConditionalWrite::Rejected { current } = store.update_if(next, &guard).unwrap() else {
            panic!("expected rejected write");
        };
        assert_eq!(current.version, 1);
    }

    #[test]
    fn update_if_missing_alert_errors() {
        let store = InMemoryAlertStore::new();
        let alert = assigned(DriverId::new());
        let guard = AlertGuard::of(&alert);
        assert!(matches!(
            store.update_if(alert, &guard),
            Err(StorageError::AlertNotFound(_))
        ));
    }

    #[test]
    fn driver_index_follows_reassignment() {
        let store = InMemoryAlertStore::new();
        let first = DriverId::new();
        let second = DriverId::new();
        let alert = assigned(first);
        AlertStore::insert(&store, alert.clone()).unwrap();

        let mut moved = alert.clone();
        moved.driver_id = Some(second);
        store.put_row(moved).unwrap();

        assert!(AlertStore::find_by_driver(&store, first).unwrap().is_empty());
        assert_eq!(AlertStore::find_by_driver(&store, second).unwrap().len(), 1);
    }

    #[test]
    fn history_is_unique_per_alert_and_ordered() {
        let store = InMemoryWorkHistoryStore::new();
        let driver = DriverId::new();
        let t0 = Utc::now();

        let mut entries = Vec::new();
        for minutes in [10, 30, 20] {
            let entry = WorkHistoryEntry::new(
                AlertId::new(),
                driver,
                BinId::new("bin1").unwrap(),
                None,
                t0,
                t0 + Duration::minutes(minutes),
            );
            store.append(entry.clone()).unwrap();
            entries.push(entry);
        }
        assert!(matches!(
            store.append(entries[0].clone()),
            Err(StorageError::DuplicateKey(_))
        ));

        let got = store.find_by_driver(driver, 2).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].work_duration_minutes(), 30);
        assert_eq!(got[1].work_duration_minutes(), 20);
    }

    #[test]
    fn location_samples_append_in_order() {
        let store = InMemoryLocationStore::new();
        let driver = DriverId::new();
        for lat in [1.0, 2.0] {
            store
                .append(DriverLocationSample {
                    driver_id: driver,
                    location: GeoPoint::new(lat, 0.0).unwrap(),
                    accuracy_m: None,
                    recorded_at: Utc::now(),
                })
                .unwrap();
        }
        let samples = store.find_by_driver(driver).unwrap();
        assert_eq!(samples.len(), 2);
        assert!((samples[1].location.latitude - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn token_store_overwrites() {
        let store = InMemoryTokenStore::new();
        let driver = DriverId::new();
        store.put(PushToken::new(driver, "a", Utc::now())).unwrap();
        store.put(PushToken::new(driver, "b", Utc::now())).unwrap();
        assert_eq!(store.get(driver).unwrap().unwrap().token, "b");
        store.clear(driver).unwrap();
        assert!(store.get(driver).unwrap().is_none());
    }
}
