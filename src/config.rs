//! Runtime configuration.
//!
//! Every field has a default, so a partial JSON file (or none at all) is
//! enough to run.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BinwatchError, BinwatchResult};

/// Location watch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub high_accuracy: bool,
    /// Oldest cached fix the host may return, and the staleness cutoff for
    /// fixes the tracker accepts.
    pub maximum_age_ms: u64,
    pub timeout_ms: u64,
    /// Fixes with a larger accuracy radius are skipped. `None` keeps all.
    pub max_accuracy_m: Option<f64>,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            maximum_age_ms: 10_000,
            timeout_ms: 5_000,
            max_accuracy_m: None,
        }
    }
}

/// Bin feed worker sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Snapshots queued ahead of the detector before `deliver` blocks.
    pub snapshot_queue_capacity: usize,
    /// Per-subscriber event buffer.
    pub stream_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            snapshot_queue_capacity: 64,
            stream_capacity: 256,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinwatchConfig {
    /// Fill level (percent) below which a `FULL` report is flagged as suspicious.
    pub full_threshold_percent: u8,

    /// Sound played for every bin-full notification.
    pub alert_sound: PathBuf,

    /// Icon attached to bin-full and push notifications.
    pub bin_full_icon: String,

    /// Title used when a push message carries none.
    pub default_push_title: String,

    /// Application credential handed to the push provider.
    pub push_credential: String,

    /// Local push-token cache file. In-memory only when unset.
    pub token_cache_path: Option<PathBuf>,

    pub location: LocationConfig,

    pub feed: FeedConfig,

    /// Seed the status cache from the first snapshot instead of alerting on
    /// every bin that is already full at startup.
    pub seed_status_cache_on_start: bool,
}

impl Default for BinwatchConfig {
    fn default() -> Self {
        Self {
            full_threshold_percent: 90,
            alert_sound: PathBuf::from("alert.mp3"),
            bin_full_icon: "/bin-full.png".to_string(),
            default_push_title: "Notification".to_string(),
            push_credential: String::new(),
            token_cache_path: None,
            location: LocationConfig::default(),
            feed: FeedConfig::default(),
            seed_status_cache_on_start: false,
        }
    }
}

impl BinwatchConfig {
    /// Loads configuration from a JSON file.
    ///
    /// # Errors
    /// `Config` if the file is missing, unreadable, not valid JSON, or fails
    /// [`BinwatchConfig::validate`].
    pub fn load(path: &Path) -> BinwatchResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| config_err(path, e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| config_err(path, e))?;
        config.validate().map_err(|reason| config_err(path, reason))?;
        tracing::info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Loads `path` if it exists, defaults otherwise.
    ///
    /// # Errors
    /// Same as [`BinwatchConfig::load`] for a file that exists but is invalid.
    pub fn load_or_default(path: &Path) -> BinwatchResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no configuration file; using defaults");
            Ok(Self::default())
        }
    }

    /// Writes the configuration as pretty JSON, creating parent directories.
    ///
    /// # Errors
    /// `Config` on any I/O or serialization failure.
    pub fn save(&self, path: &Path) -> BinwatchResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| config_err(path, e))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| config_err(path, e))?;
        fs::write(path, json).map_err(|e| config_err(path, e))
    }

    /// Checks value ranges.
    ///
    /// # Errors
    /// A description of the first out-of-range field.
    pub fn validate(&self) -> Result<(), String> {
        if self.full_threshold_percent > 100 {
            return Err(format!(
                "full_threshold_percent must be at most 100, got {}",
                self.full_threshold_percent
            ));
        }
        if self.feed.snapshot_queue_capacity == 0 || self.feed.stream_capacity == 0 {
            return Err("feed capacities must be positive".to_string());
        }
        if let Some(max) = self.location.max_accuracy_m {
            if !max.is_finite() || max <= 0.0 {
                return Err(format!("location.max_accuracy_m must be positive, got {max}"));
            }
        }
        Ok(())
    }
}

fn config_err(path: &Path, reason: impl ToString) -> BinwatchError {
    BinwatchError::Config {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
