//! # binwatch
//!
//! Bin-full alerting and driver dispatch for waste-collection fleets.
//!
//! An external sensor database publishes snapshots of every dustbin; binwatch
//! turns them into notifications and tracks the collection work that follows.
//!
//! ## Core Concepts
//!
//! - **Snapshot**: the full set of bins as last published by the sensor feed
//! - **Edge detection**: a `BinFull` event fires only when a bin *enters* `FULL`
//! - **Alert**: one collection task, moving `pending → assigned → accepted → completed`
//! - **Work history**: the durable record written when an alert completes
//!
//! ## Usage
//!
//! ```rust,ignore
//! use binwatch::{BinFeed, BinwatchConfig, BinSnapshot};
//!
//! let feed = BinFeed::new(&BinwatchConfig::default(), None);
//! let events = feed.subscribe()?;
//! feed.deliver(BinSnapshot::from_json(&payload))?;
//! for event in events.drain() {
//!     println!("{event:?}");
//! }
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

// Core types
pub mod alert;
pub mod driver;
pub mod dustbin;
pub mod error;
pub mod geo;
pub mod time;

// Host seams and configuration
pub mod config;
pub mod host;

// Storage, detection, and lifecycle
pub mod detect;
pub mod lifecycle;
pub mod location;
pub mod notify;
pub mod storage;

pub use alert::{Alert, AlertId, AlertStatus, AlertTransition, PhotoRef};
pub use config::{BinwatchConfig, FeedConfig, LocationConfig};
pub use driver::{DriverId, DriverProfile, DutyRoster};
pub use dustbin::{Bin, BinId, BinSnapshot, BinStatus};
pub use error::{BinwatchError, BinwatchResult, HostError, ValidationError};
pub use geo::GeoPoint;
pub use time::{Clock, ManualClock, SystemClock};

pub use detect::{
    AlertAssigned, AlertWatcher, BinFeed, BinFull, ChangeDetector, DomainEvent, EventStream,
    SubscriptionId,
};
pub use host::{
    AlertSound, Muted, NotificationSink, Permission, PermissionPrompt, PermissionState,
    PositionSource, PushProvider,
};
pub use lifecycle::{AlertStateMachine, AlertView, TransitionOutcome, WorkHistoryEntry};
pub use location::{
    DriverLocationSample, LocationTracker, PositionEvent, PositionFix, PositionWatch,
    TrackerState, WatchOptions,
};
pub use notify::{
    BackgroundReceiver, NotificationDispatcher, NotificationRecord, NotificationSource,
    PushPayload, PushRegistrar, PushToken, RegistrationOutcome,
};
pub use storage::StorageError;
