//! Notification channels.
//!
//! Two independent consumers of the same event taxonomy:
//! - [`NotificationDispatcher`] renders events while the app is running
//! - [`BackgroundReceiver`] renders push messages when it is not, backed by
//!   the token that [`PushRegistrar`] obtained

/// Foreground dispatch.
pub mod dispatcher;
/// Push registration and background rendering.
pub mod push;
/// Notification record types.
pub mod record;
/// Built-in sinks.
pub mod sinks;

pub use dispatcher::NotificationDispatcher;
pub use push::{BackgroundReceiver, PushPayload, PushRegistrar, PushToken, RegistrationOutcome};
pub use record::{NotificationRecord, NotificationSource};
pub use sinks::{LogSink, RecordingSink};
