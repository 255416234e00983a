//! Bin feed worker.
//!
//! The realtime store pushes full snapshots of the bins collection. The feed
//! owns the [`ChangeDetector`] on a dedicated worker thread and processes
//! snapshots strictly one at a time in arrival order, so edge detection never
//! sees two snapshots interleaved. Each event is handed to the foreground
//! notification dispatcher and then fanned out to subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};

use crate::config::{BinwatchConfig, FeedConfig};
use crate::dustbin::BinSnapshot;
use crate::error::{BinwatchError, BinwatchResult};
use crate::notify::NotificationDispatcher;

use super::detector::ChangeDetector;
use super::events::DomainEvent;
use super::stream::{EventStream, SubscriptionId};

#[derive(Debug)]
pub(crate) enum ControlMsg {
    Subscribe {
        subscription_id: SubscriptionId,
        tx: Sender<DomainEvent>,
        reply: Sender<()>,
    },
    Unsubscribe {
        subscription_id: SubscriptionId,
    },
}

#[derive(Debug)]
enum WorkMsg {
    Snapshot(BinSnapshot),
    Events(Vec<DomainEvent>),
    Flush(Sender<()>),
}

/// Counters shared with the worker.
#[derive(Debug, Default)]
struct FeedStats {
    processed_snapshots: AtomicU64,
    emitted_events: AtomicU64,
    dropped_events: AtomicU64,
    dispatch_failures: AtomicU64,
}

/// Snapshot consumer: change detection, foreground dispatch, and event fan-out.
#[derive(Debug)]
pub struct BinFeed {
    cfg: FeedConfig,
    work_tx: Sender<WorkMsg>,
    control_tx: Sender<ControlMsg>,
    stats: Arc<FeedStats>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl BinFeed {
    /// Starts the worker.
    ///
    /// With `seed_status_cache_on_start`, the first snapshot only seeds the
    /// status cache; otherwise it is processed like any other and every bin
    /// already full fires once.
    ///
    /// # Panics
    /// If the worker thread cannot be spawned.
    pub fn new(cfg: &BinwatchConfig, dispatcher: Option<Arc<NotificationDispatcher>>) -> Self {
        let detector = ChangeDetector::new(cfg.full_threshold_percent);
        Self::with_detector(&cfg.feed, detector, cfg.seed_status_cache_on_start, dispatcher)
    }

    /// Starts the worker around an existing detector.
    ///
    /// # Panics
    /// If the worker thread cannot be spawned.
    pub fn with_detector(
        cfg: &FeedConfig,
        detector: ChangeDetector,
        seed_first: bool,
        dispatcher: Option<Arc<NotificationDispatcher>>,
    ) -> Self {
        let (work_tx, work_rx) = bounded::<WorkMsg>(cfg.snapshot_queue_capacity.max(1));
        let (control_tx, control_rx) = bounded::<ControlMsg>(64);
        let stats = Arc::new(FeedStats::default());

        let worker = Worker {
            detector,
            seed_pending: seed_first,
            dispatcher,
            subs: HashMap::new(),
            stats: Arc::clone(&stats),
        };

        let join = thread::Builder::new()
            .name("binwatch-feed".to_string())
            .spawn(move || worker.run(&work_rx, &control_rx))
            .expect("failed to spawn binwatch feed worker");

        Self {
            cfg: cfg.clone(),
            work_tx,
            control_tx,
            stats,
            join: Mutex::new(Some(join)),
        }
    }

    /// Registers a subscriber for every event emitted after this call returns.
    ///
    /// # Errors
    /// `Disconnected` if the worker has stopped.
    pub fn subscribe(&self) -> BinwatchResult<EventStream> {
        let subscription_id = SubscriptionId::new();
        let (tx, rx) = bounded::<DomainEvent>(self.cfg.stream_capacity.max(1));
        let (reply_tx, reply_rx) = bounded::<()>(1);

        self.control_tx
            .send(ControlMsg::Subscribe {
                subscription_id,
                tx,
                reply: reply_tx,
            })
            .map_err(|_| disconnected())?;
        reply_rx.recv().map_err(|_| disconnected())?;

        Ok(EventStream::new(subscription_id, rx, self.control_tx.clone()))
    }

    /// Queues a snapshot. Blocks while the queue is full; snapshots are never
    /// dropped, because losing one could hide a transition.
    ///
    /// # Errors
    /// `Disconnected` if the worker has stopped.
    pub fn deliver(&self, snapshot: BinSnapshot) -> BinwatchResult<()> {
        self.work_tx.send(WorkMsg::Snapshot(snapshot)).map_err(|_| disconnected())
    }

    /// Parses the realtime store's JSON value and queues it.
    ///
    /// # Errors
    /// `Disconnected` if the worker has stopped.
    pub fn deliver_json(&self, value: &serde_json::Value) -> BinwatchResult<()> {
        self.deliver(BinSnapshot::from_json(value))
    }

    /// Queues events raised elsewhere (for example by an
    /// [`super::AlertWatcher`]) for dispatch and fan-out, in order with
    /// snapshot-derived events.
    ///
    /// # Errors
    /// `Disconnected` if the worker has stopped.
    pub fn publish(&self, events: Vec<DomainEvent>) -> BinwatchResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        self.work_tx.send(WorkMsg::Events(events)).map_err(|_| disconnected())
    }

    /// Blocks until everything queued before this call has been processed.
    ///
    /// # Errors
    /// `Disconnected` if the worker has stopped.
    pub fn flush(&self) -> BinwatchResult<()> {
        let (tx, rx) = bounded::<()>(1);
        self.work_tx.send(WorkMsg::Flush(tx)).map_err(|_| disconnected())?;
        rx.recv().map_err(|_| disconnected())
    }

    #[must_use]
    pub fn processed_snapshots(&self) -> u64 {
        self.stats.processed_snapshots.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn emitted_events(&self) -> u64 {
        self.stats.emitted_events.load(Ordering::Relaxed)
    }

    /// Events a slow subscriber missed because its buffer was full.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.stats.dropped_events.load(Ordering::Relaxed)
    }

    /// Events whose foreground notification failed.
    #[must_use]
    pub fn dispatch_failures(&self) -> u64 {
        self.stats.dispatch_failures.load(Ordering::Relaxed)
    }
}

impl Drop for BinFeed {
    fn drop(&mut self) {
        // Close the work channel so the worker drains and exits, then join.
        // Streams keep the control channel alive, so it cannot be the signal.
        let (dummy_tx, _) = bounded::<WorkMsg>(1);
        drop(std::mem::replace(&mut self.work_tx, dummy_tx));

        if let Ok(mut guard) = self.join.lock() {
            if let Some(handle) = guard.take() {
                if handle.join().is_err() {
                    tracing::error!("binwatch feed worker panicked");
                }
            }
        }
    }
}

fn disconnected() -> BinwatchError {
    BinwatchError::Disconnected {
        path: "bin_feed".to_string(),
    }
}

struct Worker {
    detector: ChangeDetector,
    seed_pending: bool,
    dispatcher: Option<Arc<NotificationDispatcher>>,
    subs: HashMap<SubscriptionId, Sender<DomainEvent>>,
    stats: Arc<FeedStats>,
}

impl Worker {
    fn run(mut self, work_rx: &Receiver<WorkMsg>, control_rx: &Receiver<ControlMsg>) {
        loop {
            let open = select! {
                recv(control_rx) -> msg => {
                    if let Ok(msg) = msg {
                        self.control(msg);
                    }
                    true
                }
                recv(work_rx) -> msg => match msg {
                    Ok(msg) => {
                        self.work(msg);
                        true
                    }
                    Err(_) => false,
                },
            };
            if !open {
                tracing::debug!("bin feed worker stopping");
                return;
            }
        }
    }

    fn control(&mut self, msg: ControlMsg) {
        match msg {
            ControlMsg::Subscribe {
                subscription_id,
                tx,
                reply,
            } => {
                self.subs.insert(subscription_id, tx);
                let _ = reply.send(());
            }
            ControlMsg::Unsubscribe { subscription_id } => {
                self.subs.remove(&subscription_id);
            }
        }
    }

    fn work(&mut self, msg: WorkMsg) {
        match msg {
            WorkMsg::Snapshot(snapshot) => {
                self.stats.processed_snapshots.fetch_add(1, Ordering::Relaxed);
                if std::mem::take(&mut self.seed_pending) {
                    self.detector.seed(&snapshot);
                    return;
                }
                for event in self.detector.observe(&snapshot) {
                    self.emit(&DomainEvent::BinFull(event));
                }
            }
            WorkMsg::Events(events) => {
                for event in &events {
                    self.emit(event);
                }
            }
            WorkMsg::Flush(reply) => {
                let _ = reply.send(());
            }
        }
    }

    fn emit(&mut self, event: &DomainEvent) {
        self.stats.emitted_events.fetch_add(1, Ordering::Relaxed);

        if let Some(dispatcher) = &self.dispatcher {
            match dispatcher.dispatch(event) {
                Ok(_) => {}
                Err(e) if e.is_permission_denied() => {
                    tracing::debug!("notifications not permitted; event not shown");
                }
                Err(e) => {
                    self.stats.dispatch_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(error = %e, "foreground notification failed");
                }
            }
        }

        let stats = &self.stats;
        self.subs.retain(|id, tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                stats.dropped_events.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(subscription_id = %id, "subscriber lagging; event dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::dustbin::{Bin, BinId, BinStatus};

    fn snap(status: BinStatus) -> BinSnapshot {
        BinSnapshot::from_bins([Bin::new(BinId::new("B1").unwrap(), 95, status).unwrap()])
    }

    #[test]
    fn events_reach_subscribers_in_order() {
        let feed = BinFeed::new(&BinwatchConfig::default(), None);
        let stream = feed.subscribe().unwrap();

        for status in [BinStatus::Full, BinStatus::Normal, BinStatus::Full] {
            feed.deliver(snap(status)).unwrap();
        }
        feed.flush().unwrap();

        let events = stream.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(feed.processed_snapshots(), 3);
        assert!(stream.recv_timeout(Duration::from_millis(10)).is_err());
    }

    #[test]
    fn seed_first_suppresses_cold_start_events() {
        let mut cfg = BinwatchConfig::default();
        cfg.seed_status_cache_on_start = true;
        let feed = BinFeed::new(&cfg, None);
        let stream = feed.subscribe().unwrap();

        feed.deliver(snap(BinStatus::Full)).unwrap();
        feed.deliver(snap(BinStatus::Full)).unwrap();
        feed.flush().unwrap();
        assert!(stream.drain().is_empty());
    }

    #[test]
    fn slow_subscriber_drops_without_stalling() {
        let mut cfg = BinwatchConfig::default();
        cfg.feed.stream_capacity = 1;
        let feed = BinFeed::new(&cfg, None);
        let stream = feed.subscribe().unwrap();

        for _ in 0..3 {
            feed.deliver(snap(BinStatus::Normal)).unwrap();
            feed.deliver(snap(BinStatus::Full)).unwrap();
        }
        feed.flush().unwrap();

        assert_eq!(feed.emitted_events(), 3);
        assert_eq!(feed.dropped_events(), 2);
        assert_eq!(stream.drain().len(), 1);
    }

    #[test]
    fn unsubscribed_stream_stops_receiving() {
        let feed = BinFeed::new(&BinwatchConfig::default(), None);
        let stream = feed.subscribe().unwrap();
        stream.unsubscribe();
        // Unsubscribe travels on the control channel; a round trip through
        // subscribe guarantees it has been applied.
        let _other = feed.subscribe().unwrap();

        feed.deliver(snap(BinStatus::Full)).unwrap();
        feed.flush().unwrap();
        assert!(stream.drain().is_empty());
    }
}
