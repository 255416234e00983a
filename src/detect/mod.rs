//! Change detection and event delivery.
//!
//! Snapshots from the realtime store go through a [`ChangeDetector`] on the
//! [`BinFeed`] worker; alert lists re-fetched from the relational store go
//! through an [`AlertWatcher`]. Both produce [`DomainEvent`]s, which the feed
//! hands to the foreground notification channel and to any number of
//! [`EventStream`] subscribers.

/// Bin status edge detection.
pub mod detector;
/// Domain event types.
pub mod events;
/// Snapshot worker and fan-out.
pub mod feed;
/// Subscriber stream handle.
pub mod stream;
/// Alert assignment edge detection.
pub mod watcher;

pub use detector::{ChangeDetector, StatusCache};
pub use events::{AlertAssigned, BinFull, DomainEvent};
pub use feed::BinFeed;
pub use stream::{EventStream, SubscriptionId};
pub use watcher::AlertWatcher;
