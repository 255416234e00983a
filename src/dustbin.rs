//! Bin records and realtime snapshots.
//!
//! Bins are written only by the external sensor-ingestion process. This crate
//! reads them as full-collection snapshots delivered by the realtime store,
//! keyed by the store's string key for each bin.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::geo::GeoPoint;

/// Realtime-store key of a bin (for example `"bin1"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BinId(String);

impl BinId {
    /// Creates a bin id, rejecting blank keys.
    pub fn new(key: impl Into<String>) -> Result<Self, ValidationError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(ValidationError::EmptyIdentifier { field: "bin_id" });
        }
        Ok(Self(key))
    }

    /// Returns the raw key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sensor-reported state of a bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BinStatus {
    /// Below the full threshold.
    Normal,
    /// Needs collection.
    Full,
    /// Any status string this crate does not know. Never treated as full.
    Unknown,
}

impl BinStatus {
    /// Parses a status string as written by the sensor pipeline.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("FULL") {
            Self::Full
        } else if raw.eq_ignore_ascii_case("NORMAL") {
            Self::Normal
        } else {
            Self::Unknown
        }
    }

    /// Returns true for [`BinStatus::Full`].
    #[must_use]
    pub const fn is_full(self) -> bool {
        matches!(self, Self::Full)
    }
}

impl Default for BinStatus {
    fn default() -> Self {
        Self::Normal
    }
}

impl fmt::Display for BinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "NORMAL"),
            Self::Full => write!(f, "FULL"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// A physical waste receptacle and its latest sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    pub id: BinId,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub address: Option<String>,

    #[serde(default)]
    pub location: Option<GeoPoint>,

    /// Fill level in percent, 0–100.
    pub fill_level: u8,

    pub status: BinStatus,

    #[serde(default)]
    pub last_sensor_update: Option<DateTime<Utc>>,
}

impl Bin {
    /// Creates a bin with the given reading. The name defaults to the key.
    pub fn new(id: BinId, fill_level: i64, status: BinStatus) -> Result<Self, ValidationError> {
        let fill_level = u8::try_from(fill_level)
            .ok()
            .filter(|v| *v <= 100)
            .ok_or(ValidationError::FillLevelOutOfRange { value: fill_level })?;
        Ok(Self {
            name: id.to_string(),
            id,
            address: None,
            location: None,
            fill_level,
            status,
            last_sensor_update: None,
        })
    }

    /// Display name, falling back to the key when the store has none.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            self.id.as_str()
        } else {
            &self.name
        }
    }

    /// True when the bin reports `FULL` although its level is below `threshold`.
    ///
    /// Status is authoritative; this only flags suspicious sensor data.
    #[must_use]
    pub fn sensor_inconsistent(&self, threshold: u8) -> bool {
        self.status.is_full() && self.fill_level < threshold
    }
}

/// Builds a bin from its realtime-store record one field at a time.
///
/// A field with the wrong type falls back to its default without affecting
/// the others, so a `FULL` status is never lost to a malformed side field.
fn bin_from_record(id: BinId, record: &serde_json::Map<String, serde_json::Value>) -> Bin {
    let status = match record.get("status") {
        Some(serde_json::Value::String(raw)) => BinStatus::parse(raw),
        _ => BinStatus::Unknown,
    };

    let fill_level = record
        .get("fill_level")
        .and_then(number_field)
        .filter(|v| v.is_finite())
        .map_or(0, |v| {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let clamped = v.round().clamp(0.0, 100.0) as u8;
            clamped
        });

    let location = match (
        record.get("latitude").and_then(number_field),
        record.get("longitude").and_then(number_field),
    ) {
        (Some(lat), Some(lng)) => GeoPoint::new(lat, lng).ok(),
        _ => None,
    };

    let last_sensor_update = string_field(record, "last_sensor_update")
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc));

    Bin {
        name: string_field(record, "name").map_or_else(|| id.to_string(), str::to_string),
        address: string_field(record, "address").map(str::to_string),
        id,
        location,
        fill_level,
        status,
        last_sensor_update,
    }
}

/// Numbers, or strings holding a number as some sensor gateways write them.
fn number_field(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn string_field<'a>(record: &'a serde_json::Map<String, serde_json::Value>, key: &str) -> Option<&'a str> {
    record.get(key).and_then(serde_json::Value::as_str)
}

/// A complete point-in-time view of every bin in the realtime store.
///
/// Iteration order is by bin key, which gives a deterministic total order
/// for processing within one snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinSnapshot {
    bins: BTreeMap<BinId, Bin>,
}

impl BinSnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a snapshot from bins. Later duplicates replace earlier ones.
    #[must_use]
    pub fn from_bins(bins: impl IntoIterator<Item = Bin>) -> Self {
        Self {
            bins: bins.into_iter().map(|b| (b.id.clone(), b)).collect(),
        }
    }

    /// Parses the realtime store's value for the bins collection.
    ///
    /// `null` (collection absent) yields an empty snapshot. Entries that are not
    /// objects or have a blank key are skipped and logged, never fatal.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        let Some(map) = value.as_object() else {
            if !value.is_null() {
                tracing::warn!(kind = json_kind(value), "bin snapshot is not an object; treating as empty");
            }
            return Self::default();
        };

        let mut bins = BTreeMap::new();
        for (key, raw) in map {
            let Ok(id) = BinId::new(key.as_str()) else {
                tracing::warn!("skipping bin with blank key");
                continue;
            };
            let Some(record) = raw.as_object() else {
                tracing::warn!(bin_id = %id, kind = json_kind(raw), "skipping bin record that is not an object");
                continue;
            };
            bins.insert(id.clone(), bin_from_record(id, record));
        }
        Self { bins }
    }

    /// Number of bins in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    /// True if the snapshot holds no bins.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Looks up a bin by key.
    #[must_use]
    pub fn get(&self, id: &BinId) -> Option<&Bin> {
        self.bins.get(id)
    }

    /// Iterates bins in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Bin> {
        self.bins.values()
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
