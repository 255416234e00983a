//! Notification sinks that need no OS integration.

use std::sync::{Mutex, MutexGuard};

use crate::error::HostError;
use crate::host::NotificationSink;

use super::record::NotificationRecord;

/// Writes notifications to the log instead of the OS tray.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn show(&self, record: &NotificationRecord) -> Result<(), HostError> {
        tracing::info!(title = %record.title, body = %record.body, source = ?record.source, "notification");
        Ok(())
    }
}

/// Keeps every shown notification in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    shown: Mutex<Vec<NotificationRecord>>,
}

impl RecordingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything shown so far, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<NotificationRecord> {
        self.lock().clone()
    }

    /// Removes and returns everything shown so far.
    pub fn take(&self) -> Vec<NotificationRecord> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<NotificationRecord>> {
        match self.shown.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl NotificationSink for RecordingSink {
    fn show(&self, record: &NotificationRecord) -> Result<(), HostError> {
        self.lock().push(record.clone());
        Ok(())
    }
}
