//! Continuous driver location reporting.
//!
//! While a driver is signed in and location permission is granted, every
//! accepted position fix is appended to the location store as one
//! [`DriverLocationSample`]. The external assignment service reads those
//! samples to pick the nearest on-duty driver.
//!
//! Positions arrive push-style from the host through a [`PositionWatch`].
//! A dedicated worker thread drains the watch so the caller never blocks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{
    bounded, select, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError,
};
use serde::{Deserialize, Serialize};

use crate::config::LocationConfig;
use crate::driver::DriverId;
use crate::error::{BinwatchError, BinwatchResult};
use crate::geo::GeoPoint;
use crate::host::{Permission, PermissionPrompt, PermissionState, PositionSource};
use crate::storage::LocationStore;
use crate::time::Clock;

/// Options handed to the host position source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    /// Prefer GPS over coarse network positioning.
    pub high_accuracy: bool,
    /// Oldest acceptable cached fix.
    pub maximum_age: Duration,
    /// How long the host may take to produce one fix.
    pub timeout: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self::from(&LocationConfig::default())
    }
}

impl From<&LocationConfig> for WatchOptions {
    fn from(cfg: &LocationConfig) -> Self {
        Self {
            high_accuracy: cfg.high_accuracy,
            maximum_age: Duration::from_millis(cfg.maximum_age_ms),
            timeout: Duration::from_millis(cfg.timeout_ms),
        }
    }
}

/// One position reported by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFix {
    pub location: GeoPoint,
    /// Horizontal accuracy radius in meters, when the host reports it.
    pub accuracy_m: Option<f64>,
    /// When the host acquired the fix.
    pub observed_at: DateTime<Utc>,
}

/// Non-fatal failure for a single fix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionError {
    /// No fix within the configured timeout.
    Timeout,
    /// The host could not determine a position.
    Unavailable(String),
}

/// Event delivered on a position watch.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionEvent {
    Fix(PositionFix),
    Error(PositionError),
    /// The user changed the location permission while the watch was live.
    PermissionChanged(PermissionState),
}

/// Receiving half of a host position subscription.
///
/// Dropping the watch (or calling [`PositionWatch::cancel`]) tells the host
/// to stop producing positions.
#[derive(Debug)]
pub struct PositionWatch {
    events: Receiver<PositionEvent>,
    cancelled: Arc<AtomicBool>,
}

/// Sending half of a position subscription, held by the host.
#[derive(Debug, Clone)]
pub struct PositionFeed {
    events: Sender<PositionEvent>,
    cancelled: Arc<AtomicBool>,
}

impl PositionWatch {
    /// Creates a connected feed/watch pair with a bounded buffer.
    #[must_use]
    pub fn channel(capacity: usize) -> (PositionFeed, Self) {
        let (tx, rx) = bounded(capacity.max(1));
        let cancelled = Arc::new(AtomicBool::new(false));
        (
            PositionFeed {
                events: tx,
                cancelled: Arc::clone(&cancelled),
            },
            Self { events: rx, cancelled },
        )
    }

    /// Blocks up to `timeout` for the next event.
    ///
    /// Returns `Ok(None)` on timeout.
    ///
    /// # Errors
    /// `Disconnected` once the host has closed the feed.
    pub fn recv_timeout(&self, timeout: Duration) -> BinwatchResult<Option<PositionEvent>> {
        match self.events.recv_timeout(timeout) {
            Ok(ev) => Ok(Some(ev)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(BinwatchError::Disconnected {
                path: "position_watch".to_string(),
            }),
        }
    }

    /// Stops the subscription.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    fn receiver(&self) -> &Receiver<PositionEvent> {
        &self.events
    }
}

impl Drop for PositionWatch {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl PositionFeed {
    /// Pushes an event without blocking. Returns false if the watch is gone,
    /// cancelled, or full.
    pub fn push(&self, event: PositionEvent) -> bool {
        if self.is_cancelled() {
            return false;
        }
        match self.events.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => false,
        }
    }

    /// True once the consumer cancelled or dropped the watch.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Persisted position sample. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverLocationSample {
    pub driver_id: DriverId,
    pub location: GeoPoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_m: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

/// Tracker lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerState {
    /// Not tracking and not waiting for anything.
    Idle,
    /// A watch is live and samples are being written.
    Tracking,
    /// Permission was revoked; tracking resumes when it is granted again.
    Suspended,
}

struct Worker {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

struct TrackerInner {
    driver: Option<DriverId>,
    worker: Option<Worker>,
}

/// Writes the signed-in driver's position to the location store.
pub struct LocationTracker {
    source: Arc<dyn PositionSource>,
    permissions: Arc<dyn PermissionPrompt>,
    store: Arc<dyn LocationStore>,
    clock: Arc<dyn Clock>,
    options: WatchOptions,
    max_accuracy_m: Option<f64>,
    state: Arc<Mutex<TrackerState>>,
    inner: Mutex<TrackerInner>,
}

impl LocationTracker {
    /// Creates an idle tracker.
    pub fn new(
        cfg: &LocationConfig,
        source: Arc<dyn PositionSource>,
        permissions: Arc<dyn PermissionPrompt>,
        store: Arc<dyn LocationStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            permissions,
            store,
            clock,
            options: WatchOptions::from(cfg),
            max_accuracy_m: cfg.max_accuracy_m,
            state: Arc::new(Mutex::new(TrackerState::Idle)),
            inner: Mutex::new(TrackerInner {
                driver: None,
                worker: None,
            }),
        }
    }

    /// Current tracker state.
    #[must_use]
    pub fn state(&self) -> TrackerState {
        *lock(&self.state)
    }

    /// Starts reporting positions for `driver`.
    ///
    /// Calling again for the same driver while tracking is a no-op; a
    /// different driver replaces the current one.
    ///
    /// # Errors
    /// - `PermissionDenied` if location permission is not granted
    /// - `Host` if the position source refuses to start
    pub fn start(&self, driver: DriverId) -> BinwatchResult<()> {
        let mut inner = lock(&self.inner);
        if inner.driver == Some(driver) && self.state() == TrackerState::Tracking {
            return Ok(());
        }
        self.shutdown_worker(&mut inner);
        inner.driver = Some(driver);

        if !self.permissions.request(Permission::Location).is_granted() {
            tracing::warn!(driver_id = %driver, "location permission not granted; tracking disabled");
            self.set_state(TrackerState::Suspended);
            return Err(BinwatchError::PermissionDenied {
                permission: Permission::Location,
            });
        }

        self.spawn_worker(&mut inner, driver)
    }

    /// Stops reporting and forgets the driver.
    pub fn stop(&self) {
        let mut inner = lock(&self.inner);
        self.shutdown_worker(&mut inner);
        inner.driver = None;
        self.set_state(TrackerState::Idle);
    }

    /// Reacts to a permission change reported by the host.
    ///
    /// Revocation tears the watch down; a later grant restarts it for the
    /// same driver.
    ///
    /// # Errors
    /// `Host` if restarting the position source fails.
    pub fn on_permission_change(&self, permission: PermissionState) -> BinwatchResult<()> {
        let mut inner = lock(&self.inner);
        let Some(driver) = inner.driver else {
            return Ok(());
        };

        if permission.is_granted() {
            if self.state() == TrackerState::Tracking {
                return Ok(());
            }
            tracing::info!(driver_id = %driver, "location permission granted; resuming tracking");
            self.shutdown_worker(&mut inner);
            self.spawn_worker(&mut inner, driver)
        } else {
            tracing::warn!(driver_id = %driver, state = ?permission, "location permission revoked; suspending tracking");
            self.shutdown_worker(&mut inner);
            self.set_state(TrackerState::Suspended);
            Ok(())
        }
    }

    fn spawn_worker(&self, inner: &mut TrackerInner, driver: DriverId) -> BinwatchResult<()> {
        let watch = self.source.watch(&self.options)?;
        let (shutdown, shutdown_rx) = bounded::<()>(1);

        let ctx = WorkerCtx {
            driver,
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            maximum_age: chrono::Duration::from_std(self.options.maximum_age)
                .unwrap_or_else(|_| chrono::Duration::zero()),
            max_accuracy_m: self.max_accuracy_m,
            state: Arc::clone(&self.state),
        };

        self.set_state(TrackerState::Tracking);
        let handle = thread::Builder::new()
            .name("binwatch-location".to_string())
            .spawn(move || worker_loop(&ctx, &watch, &shutdown_rx))
            .map_err(|e| {
                self.set_state(TrackerState::Idle);
                BinwatchError::internal(format!("failed to spawn location worker: {e}"))
            })?;

        tracing::info!(driver_id = %driver, "location tracking started");
        inner.worker = Some(Worker { shutdown, handle });
        Ok(())
    }

    fn shutdown_worker(&self, inner: &mut TrackerInner) {
        let Some(worker) = inner.worker.take() else { return };
        drop(worker.shutdown);
        if worker.handle.join().is_err() {
            tracing::error!("location worker panicked");
        }
        self.set_state(TrackerState::Idle);
    }

    fn set_state(&self, state: TrackerState) {
        *lock(&self.state) = state;
    }
}

impl Drop for LocationTracker {
    fn drop(&mut self) {
        let mut inner = lock(&self.inner);
        self.shutdown_worker(&mut inner);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct WorkerCtx {
    driver: DriverId,
    store: Arc<dyn LocationStore>,
    clock: Arc<dyn Clock>,
    maximum_age: chrono::Duration,
    max_accuracy_m: Option<f64>,
    state: Arc<Mutex<TrackerState>>,
}

impl WorkerCtx {
    fn accepts(&self, fix: &PositionFix, now: DateTime<Utc>) -> bool {
        if now - fix.observed_at > self.maximum_age {
            tracing::debug!(driver_id = %self.driver, observed_at = %fix.observed_at, "dropping stale fix");
            return false;
        }
        match (fix.accuracy_m, self.max_accuracy_m) {
            (Some(acc), Some(max)) if acc > max => {
                tracing::debug!(driver_id = %self.driver, accuracy_m = acc, "dropping imprecise fix");
                false
            }
            _ => true,
        }
    }
}

enum Step {
    Continue,
    /// Leave the loop; `Some` records why the watch ended on its own.
    Exit(Option<TrackerState>),
}

fn worker_loop(ctx: &WorkerCtx, watch: &PositionWatch, shutdown_rx: &Receiver<()>) {
    loop {
        let step = select! {
            recv(shutdown_rx) -> _ => Step::Exit(None),
            recv(watch.receiver()) -> ev => handle_event(ctx, ev.ok(), shutdown_rx),
        };
        if let Step::Exit(state) = step {
            watch.cancel();
            if let Some(state) = state {
                *lock(&ctx.state) = state;
            }
            return;
        }
    }
}

fn handle_event(ctx: &WorkerCtx, event: Option<PositionEvent>, shutdown_rx: &Receiver<()>) -> Step {
    match event {
        Some(PositionEvent::Fix(fix)) => {
            let now = ctx.clock.now();
            if !ctx.accepts(&fix, now) {
                return Step::Continue;
            }
            let sample = DriverLocationSample {
                driver_id: ctx.driver,
                location: fix.location,
                accuracy_m: fix.accuracy_m,
                recorded_at: now,
            };
            // select! may pick a queued fix over a shutdown that is already ready.
            if !matches!(shutdown_rx.try_recv(), Err(TryRecvError::Empty)) {
                return Step::Exit(None);
            }
            match ctx.store.append(sample) {
                Ok(()) => Step::Continue,
                Err(e) => {
                    tracing::error!(driver_id = %ctx.driver, error = %e, "location append failed; stopping tracker");
                    Step::Exit(Some(TrackerState::Idle))
                }
            }
        }
        Some(PositionEvent::Error(e)) => {
            tracing::warn!(driver_id = %ctx.driver, error = ?e, "position fix failed");
            Step::Continue
        }
        Some(PositionEvent::PermissionChanged(state)) if !state.is_granted() => {
            tracing::warn!(driver_id = %ctx.driver, "location permission revoked during watch");
            Step::Exit(Some(TrackerState::Suspended))
        }
        Some(PositionEvent::PermissionChanged(_)) => Step::Continue,
        None => {
            tracing::info!(driver_id = %ctx.driver, "position source closed");
            Step::Exit(Some(TrackerState::Idle))
        }
    }
}
