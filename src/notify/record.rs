//! User-facing notification records.

use serde::{Deserialize, Serialize};

use crate::alert::AlertId;
use crate::dustbin::BinId;

/// What caused a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationSource {
    BinFull { bin_id: BinId },
    AlertAssigned { alert_id: AlertId },
    /// A push message rendered by the background receiver.
    Push,
}

/// One notification, alive only for the duration of a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub source: NotificationSource,
}
