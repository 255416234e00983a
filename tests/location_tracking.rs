use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;

use binwatch::location::PositionFeed;
use binwatch::storage::{InMemoryLocationStore, LocationStore, StorageError};
use binwatch::{
    BinwatchConfig, DriverId, DriverLocationSample, GeoPoint, HostError, LocationTracker,
    Permission, PermissionPrompt, PermissionState, PositionEvent, PositionFix, PositionSource,
    PositionWatch, SystemClock, TrackerState, WatchOptions,
};

/// Position source that hands the test the host side of every watch.
#[derive(Default)]
struct FakeGps {
    feeds: Mutex<Vec<PositionFeed>>,
}

impl FakeGps {
    fn latest(&self) -> PositionFeed {
        self.feeds.lock().unwrap().last().cloned().expect("no watch started")
    }

    fn watches(&self) -> usize {
        self.feeds.lock().unwrap().len()
    }
}

impl PositionSource for FakeGps {
    fn watch(&self, _: &WatchOptions) -> Result<PositionWatch, HostError> {
        let (feed, watch) = PositionWatch::channel(16);
        self.feeds.lock().unwrap().push(feed);
        Ok(watch)
    }
}

struct Switch(Mutex<PermissionState>);

impl Switch {
    fn new(state: PermissionState) -> Arc<Self> {
        Arc::new(Self(Mutex::new(state)))
    }

    fn set(&self, state: PermissionState) {
        *self.0.lock().unwrap() = state;
    }
}

impl PermissionPrompt for Switch {
    fn query(&self, _: Permission) -> PermissionState {
        *self.0.lock().unwrap()
    }
    fn request(&self, _: Permission) -> PermissionState {
        *self.0.lock().unwrap()
    }
}

struct BrokenStore;

impl LocationStore for BrokenStore {
    fn append(&self, _: DriverLocationSample) -> Result<(), StorageError> {
        Err(StorageError::ConnectionError("database offline".to_string()))
    }
    fn find_by_driver(&self, _: DriverId) -> Result<Vec<DriverLocationSample>, StorageError> {
        Ok(Vec::new())
    }
}

fn fix() -> PositionEvent {
    PositionEvent::Fix(PositionFix {
        location: GeoPoint::new(12.9716, 77.5946).unwrap(),
        accuracy_m: Some(8.0),
        observed_at: Utc::now(),
    })
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn tracker(
    gps: &Arc<FakeGps>,
    permissions: &Arc<Switch>,
    store: Arc<dyn LocationStore>,
) -> LocationTracker {
    LocationTracker::new(
        &BinwatchConfig::default().location,
        gps.clone(),
        permissions.clone(),
        store,
        Arc::new(SystemClock),
    )
}

#[test]
fn fixes_are_stored_for_the_driver() {
    let gps = Arc::new(FakeGps::default());
    let permissions = Switch::new(PermissionState::Granted);
    let store = Arc::new(InMemoryLocationStore::new());
    let tracker = tracker(&gps, &permissions, store.clone());
    let driver = DriverId::new();

    tracker.start(driver).unwrap();
    assert_eq!(tracker.state(), TrackerState::Tracking);

    // Same driver again keeps the existing watch.
    tracker.start(driver).unwrap();
    assert_eq!(gps.watches(), 1);

    assert!(gps.latest().push(fix()));
    assert!(gps.latest().push(fix()));
    assert!(wait_until(|| store.find_by_driver(driver).unwrap().len() == 2));

    tracker.stop();
    assert_eq!(tracker.state(), TrackerState::Idle);
    assert!(gps.latest().is_cancelled());
}

#[test]
fn denied_permission_suspends_without_watching() {
    let gps = Arc::new(FakeGps::default());
    let permissions = Switch::new(PermissionState::Denied);
    let tracker = tracker(&gps, &permissions, Arc::new(InMemoryLocationStore::new()));

    let err = tracker.start(DriverId::new()).unwrap_err();
    assert!(err.is_permission_denied());
    assert_eq!(tracker.state(), TrackerState::Suspended);
    assert_eq!(gps.watches(), 0);
}

#[test]
fn revoke_and_regrant_restarts_the_watch() {
    let gps = Arc::new(FakeGps::default());
    let permissions = Switch::new(PermissionState::Granted);
    let store = Arc::new(InMemoryLocationStore::new());
    let tracker = tracker(&gps, &permissions, store.clone());
    let driver = DriverId::new();

    tracker.start(driver).unwrap();
    let first = gps.latest();

    permissions.set(PermissionState::Denied);
    tracker.on_permission_change(PermissionState::Denied).unwrap();
    assert_eq!(tracker.state(), TrackerState::Suspended);
    assert!(first.is_cancelled());

    permissions.set(PermissionState::Granted);
    tracker.on_permission_change(PermissionState::Granted).unwrap();
    assert_eq!(tracker.state(), TrackerState::Tracking);
    assert_eq!(gps.watches(), 2);

    assert!(gps.latest().push(fix()));
    assert!(wait_until(|| store.find_by_driver(driver).unwrap().len() == 1));
}

#[test]
fn revocation_reported_by_the_watch_suspends() {
    let gps = Arc::new(FakeGps::default());
    let permissions = Switch::new(PermissionState::Granted);
    let tracker = tracker(&gps, &permissions, Arc::new(InMemoryLocationStore::new()));

    tracker.start(DriverId::new()).unwrap();
    assert!(gps
        .latest()
        .push(PositionEvent::PermissionChanged(PermissionState::Denied)));

    assert!(wait_until(|| tracker.state() == TrackerState::Suspended));
}

#[test]
fn store_failure_stops_tracking() {
    let gps = Arc::new(FakeGps::default());
    let permissions = Switch::new(PermissionState::Granted);
    let tracker = tracker(&gps, &permissions, Arc::new(BrokenStore));

    tracker.start(DriverId::new()).unwrap();
    assert!(gps.latest().push(fix()));

    assert!(wait_until(|| tracker.state() == TrackerState::Idle));
    assert!(wait_until(|| gps.latest().is_cancelled()));
}
