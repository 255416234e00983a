//! Host-environment seams.
//!
//! Everything the device or browser provides (permission prompts, the OS
//! notification tray, audio output, the push provider, and position
//! updates) sits behind one of these traits so the core runs unchanged on
//! any host and in tests.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::HostError;
use crate::location::{PositionWatch, WatchOptions};
use crate::notify::NotificationRecord;

/// A host permission the core depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Show OS-level notifications and receive push messages.
    Notifications,
    /// Continuous ("allow all the time") device location.
    Location,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Notifications => write!(f, "notifications"),
            Self::Location => write!(f, "location"),
        }
    }
}

/// Host answer for a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    Granted,
    Denied,
    /// Not decided yet; the host would prompt the user.
    Prompt,
}

impl PermissionState {
    /// Returns true for [`PermissionState::Granted`].
    #[must_use]
    pub const fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Permission checks and prompts.
pub trait PermissionPrompt: Send + Sync {
    /// Current state without prompting.
    fn query(&self, permission: Permission) -> PermissionState;

    /// Asks the user if undecided and returns the resulting state.
    fn request(&self, permission: Permission) -> PermissionState;
}

/// OS notification renderer.
pub trait NotificationSink: Send + Sync {
    /// Shows one notification.
    fn show(&self, record: &NotificationRecord) -> Result<(), HostError>;
}

/// Audio output for the alert chime.
pub trait AlertSound: Send + Sync {
    /// Plays the sound file at `path` without waiting for it to finish.
    fn play(&self, path: &Path) -> Result<(), HostError>;
}

/// Push-delivery provider.
pub trait PushProvider: Send + Sync {
    /// Issues (or returns the existing) delivery token for this device.
    fn issue_token(&self, credential: &str) -> Result<String, HostError>;
}

/// Device position updates.
pub trait PositionSource: Send + Sync {
    /// Starts a push-driven position subscription.
    fn watch(&self, options: &WatchOptions) -> Result<PositionWatch, HostError>;
}

/// Sound output that does nothing, for hosts without audio.
#[derive(Debug, Clone, Copy, Default)]
pub struct Muted;

impl AlertSound for Muted {
    fn play(&self, path: &Path) -> Result<(), HostError> {
        tracing::trace!(path = %path.display(), "alert sound muted");
        Ok(())
    }
}
