//! Foreground notification channel.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::BinwatchConfig;
use crate::detect::{AlertAssigned, BinFull, DomainEvent};
use crate::error::{BinwatchError, BinwatchResult};
use crate::host::{AlertSound, NotificationSink, Permission, PermissionPrompt};

use super::record::{NotificationRecord, NotificationSource};

/// Turns domain events into OS notifications while the app is running.
pub struct NotificationDispatcher {
    sink: Arc<dyn NotificationSink>,
    sound: Arc<dyn AlertSound>,
    permissions: Arc<dyn PermissionPrompt>,
    icon: String,
    sound_path: PathBuf,
}

impl NotificationDispatcher {
    pub fn new(
        cfg: &BinwatchConfig,
        sink: Arc<dyn NotificationSink>,
        sound: Arc<dyn AlertSound>,
        permissions: Arc<dyn PermissionPrompt>,
    ) -> Self {
        Self {
            sink,
            sound,
            permissions,
            icon: cfg.bin_full_icon.clone(),
            sound_path: cfg.alert_sound.clone(),
        }
    }

    /// Builds the record for `event` without showing it.
    #[must_use]
    pub fn render(&self, event: &DomainEvent) -> NotificationRecord {
        match event {
            DomainEvent::BinFull(e) => self.render_bin_full(e),
            DomainEvent::AlertAssigned(e) => render_assigned(e),
        }
    }

    /// Shows the notification for `event`; bin-full events also play the
    /// alert sound.
    ///
    /// A sound failure is logged and does not fail the dispatch.
    ///
    /// # Errors
    /// - `PermissionDenied` if notifications are not granted (nothing shown)
    /// - `Host` if the sink fails to render
    pub fn dispatch(&self, event: &DomainEvent) -> BinwatchResult<NotificationRecord> {
        if !self.permissions.query(Permission::Notifications).is_granted() {
            return Err(BinwatchError::PermissionDenied {
                permission: Permission::Notifications,
            });
        }

        let record = self.render(event);
        self.sink.show(&record)?;

        if matches!(event, DomainEvent::BinFull(_)) {
            if let Err(e) = self.sound.play(&self.sound_path) {
                tracing::warn!(error = %e, path = %self.sound_path.display(), "alert sound failed");
            }
        }
        Ok(record)
    }

    fn render_bin_full(&self, e: &BinFull) -> NotificationRecord {
        NotificationRecord {
            title: format!("Dustbin {} is FULL", e.bin_id),
            body: format!("Fill level: {}%", e.fill_level),
            icon: Some(self.icon.clone()),
            source: NotificationSource::BinFull {
                bin_id: e.bin_id.clone(),
            },
        }
    }
}

fn render_assigned(e: &AlertAssigned) -> NotificationRecord {
    let body = match e.distance_km {
        Some(km) => format!("Bin {} · {km:.1} km away", e.bin_id),
        None => format!("Bin {}", e.bin_id),
    };
    NotificationRecord {
        title: "New alert assigned".to_string(),
        body,
        icon: None,
        source: NotificationSource::AlertAssigned { alert_id: e.alert_id },
    }
}
