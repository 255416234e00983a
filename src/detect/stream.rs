use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BinwatchError, BinwatchResult};

use super::events::DomainEvent;
use super::feed::ControlMsg;

/// Unique identifier for an event subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A subscription stream for domain events.
///
/// Events are delivered in emission order. A subscriber that falls behind
/// loses events rather than stalling the feed. Dropping this stream
/// attempts best-effort unregistration.
#[derive(Debug)]
pub struct EventStream {
    subscription_id: SubscriptionId,
    rx: Receiver<DomainEvent>,
    control_tx: Sender<ControlMsg>,
    unregistered: AtomicBool,
}

impl EventStream {
    pub(crate) fn new(
        subscription_id: SubscriptionId,
        rx: Receiver<DomainEvent>,
        control_tx: Sender<ControlMsg>,
    ) -> Self {
        Self {
            subscription_id,
            rx,
            control_tx,
            unregistered: AtomicBool::new(false),
        }
    }

    /// The subscription id backing this stream.
    #[must_use]
    pub const fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    /// Best-effort explicit unregistration. Non-blocking and idempotent.
    pub fn unsubscribe(&self) {
        if self.unregistered.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.control_tx.try_send(ControlMsg::Unsubscribe {
            subscription_id: self.subscription_id,
        });
    }

    /// Receive the next event (blocking).
    ///
    /// # Errors
    /// `Disconnected` once the feed is gone and the buffer is drained.
    pub fn recv(&self) -> BinwatchResult<DomainEvent> {
        self.rx.recv().map_err(|_| BinwatchError::Disconnected {
            path: "event_stream".to_string(),
        })
    }

    /// Receive the next event with a timeout.
    ///
    /// # Errors
    /// `Timeout` or `Disconnected`.
    pub fn recv_timeout(&self, timeout: Duration) -> BinwatchResult<DomainEvent> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => BinwatchError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
            RecvTimeoutError::Disconnected => BinwatchError::Disconnected {
                path: "event_stream".to_string(),
            },
        })
    }

    /// Drains everything currently buffered without blocking.
    pub fn drain(&self) -> Vec<DomainEvent> {
        let mut out = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(ev) => out.push(ev),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return out,
            }
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        // Best-effort: do not block on shutdown.
        self.unsubscribe();
    }
}
