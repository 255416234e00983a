//! Background push channel: token registration and message rendering.
//!
//! Neither type here shares state with the foreground dispatcher. The
//! background receiver in particular runs in whatever context the host
//! invokes it from, with nothing but its own configuration.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::BinwatchConfig;
use crate::driver::DriverId;
use crate::error::{BinwatchError, BinwatchResult};
use crate::host::{NotificationSink, Permission, PermissionPrompt, PushProvider};
use crate::storage::{self, PushTokenStore};
use crate::time::Clock;

use super::record::{NotificationRecord, NotificationSource};

/// Device push-delivery token for a driver. The latest value wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushToken {
    pub driver_id: DriverId,
    pub token: String,
    pub registered_at: DateTime<Utc>,
}

impl PushToken {
    #[must_use]
    pub fn new(driver_id: DriverId, token: impl Into<String>, registered_at: DateTime<Utc>) -> Self {
        Self {
            driver_id,
            token: token.into(),
            registered_at,
        }
    }
}

/// Title and body extracted from a push message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushPayload {
    pub title: Option<String>,
    pub body: Option<String>,
}

impl PushPayload {
    /// Extracts `notification.title` and `notification.body`.
    ///
    /// Field-wise lenient: a missing, empty, or non-string field is `None`,
    /// and a missing or non-object `notification` yields an empty payload.
    ///
    /// # Errors
    /// `MalformedPushPayload` if the bytes are not a JSON object.
    pub fn parse(bytes: &[u8]) -> BinwatchResult<Self> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| BinwatchError::MalformedPushPayload {
                reason: e.to_string(),
            })?;
        let Some(root) = value.as_object() else {
            return Err(BinwatchError::MalformedPushPayload {
                reason: "payload is not a JSON object".to_string(),
            });
        };

        let notification = root.get("notification").and_then(serde_json::Value::as_object);
        let field = |name: &str| {
            notification
                .and_then(|n| n.get(name))
                .and_then(serde_json::Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Ok(Self {
            title: field("title"),
            body: field("body"),
        })
    }
}

/// Renders push messages that arrive while the app is not active.
pub struct BackgroundReceiver {
    sink: Arc<dyn NotificationSink>,
    default_title: String,
    icon: String,
}

impl BackgroundReceiver {
    pub fn new(cfg: &BinwatchConfig, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            sink,
            default_title: cfg.default_push_title.clone(),
            icon: cfg.bin_full_icon.clone(),
        }
    }

    /// Handles one push message. Never fails: malformed input degrades to the
    /// default title and an empty body, and render failures are logged.
    pub fn on_message(&self, payload: &[u8]) -> NotificationRecord {
        let parsed = PushPayload::parse(payload).unwrap_or_else(|e| {
            tracing::warn!(error = %e, bytes = payload.len(), "malformed push payload; using defaults");
            PushPayload::default()
        });

        let record = NotificationRecord {
            title: parsed.title.unwrap_or_else(|| self.default_title.clone()),
            body: parsed.body.unwrap_or_default(),
            icon: Some(self.icon.clone()),
            source: NotificationSource::Push,
        };

        if let Err(e) = self.sink.show(&record) {
            tracing::error!(error = %e, title = %record.title, "failed to render push notification");
        }
        record
    }
}

/// Result of a registration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Registered(PushToken),
    /// The user declined notifications. Nothing is retried until the
    /// permission changes outside the app.
    PermissionDenied,
    /// The push provider did not issue a token.
    TokenUnavailable,
}

/// Obtains the device push token and caches it for the signed-in driver.
pub struct PushRegistrar {
    permissions: Arc<dyn PermissionPrompt>,
    provider: Arc<dyn PushProvider>,
    tokens: Arc<dyn PushTokenStore>,
    clock: Arc<dyn Clock>,
    credential: String,
}

impl PushRegistrar {
    pub fn new(
        cfg: &BinwatchConfig,
        permissions: Arc<dyn PermissionPrompt>,
        provider: Arc<dyn PushProvider>,
        tokens: Arc<dyn PushTokenStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            permissions,
            provider,
            tokens,
            clock,
            credential: cfg.push_credential.clone(),
        }
    }

    /// Like [`PushRegistrar::new`], with the token store chosen by
    /// `token_cache_path`.
    pub fn from_config(
        cfg: &BinwatchConfig,
        permissions: Arc<dyn PermissionPrompt>,
        provider: Arc<dyn PushProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(cfg, permissions, provider, storage::token_store(cfg), clock)
    }

    /// Requests permission, obtains a token, and stores it for `driver`.
    ///
    /// Safe to call on every start: an unchanged token is not rewritten and a
    /// changed one replaces the cached value. Failures are logged, never
    /// returned.
    pub fn register(&self, driver: DriverId) -> RegistrationOutcome {
        if !self.permissions.request(Permission::Notifications).is_granted() {
            tracing::info!(driver_id = %driver, "notification permission denied; push disabled");
            return RegistrationOutcome::PermissionDenied;
        }

        let issued = match self.provider.issue_token(&self.credential) {
            Ok(t) if !t.trim().is_empty() => t,
            Ok(_) => {
                tracing::warn!(driver_id = %driver, "push provider returned an empty token");
                return RegistrationOutcome::TokenUnavailable;
            }
            Err(e) => {
                tracing::warn!(driver_id = %driver, error = %e, "failed to obtain push token");
                return RegistrationOutcome::TokenUnavailable;
            }
        };

        match self.tokens.get(driver) {
            Ok(Some(existing)) if existing.token == issued => {
                tracing::debug!(driver_id = %driver, "push token unchanged");
                return RegistrationOutcome::Registered(existing);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(driver_id = %driver, error = %e, "token cache unreadable; overwriting");
            }
        }

        let token = PushToken::new(driver, issued, self.clock.now());
        if let Err(e) = self.tokens.put(token.clone()) {
            tracing::warn!(driver_id = %driver, error = %e, "failed to cache push token");
        } else {
            tracing::info!(driver_id = %driver, "push token registered");
        }
        RegistrationOutcome::Registered(token)
    }
}
