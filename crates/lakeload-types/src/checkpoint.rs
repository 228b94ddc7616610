//! Checkpoint value and key types.
//!
//! A checkpoint marks "processed through this point in time" for one
//! pipeline. It is stored as a `YYYY-MM-DD HH:MM:SS` string (UTC, second
//! resolution).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Wire format of a persisted checkpoint.
pub const CHECKPOINT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Date-only layout, read as midnight.
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Alternate formats accepted when parsing record timestamps.
const ALT_NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Parse a timestamp string in any of the accepted layouts.
///
/// Accepts the checkpoint format, `T`-separated variants with optional
/// fractional seconds, RFC 3339 (converted to UTC), and a bare
/// `YYYY-MM-DD` date (midnight).
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, CHECKPOINT_FORMAT) {
        return Some(ts);
    }
    for fmt in ALT_NAIVE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(ts);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    // A bare date means midnight.
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Persisted "processed through" timestamp.
///
/// Serializes as the wire-format string, the same text the stores persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Checkpoint(NaiveDateTime);

impl Checkpoint {
    /// Create a checkpoint, truncating to whole seconds.
    #[must_use]
    pub fn new(at: NaiveDateTime) -> Self {
        Self(at.trunc_subsecs(0))
    }

    /// The current UTC time as a checkpoint.
    #[must_use]
    pub fn now() -> Self {
        Self::new(Utc::now().naive_utc())
    }

    #[must_use]
    pub fn timestamp(&self) -> NaiveDateTime {
        self.0
    }

    /// Render in the fixed wire format.
    #[must_use]
    pub fn format(&self) -> String {
        self.0.format(CHECKPOINT_FORMAT).to_string()
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

/// Error for a stored checkpoint that is not in the wire format.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid checkpoint '{raw}': expected YYYY-MM-DD HH:MM:SS")]
pub struct InvalidCheckpoint {
    pub raw: String,
}

impl FromStr for Checkpoint {
    type Err = InvalidCheckpoint;

    /// Strict parse: only the wire format is accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDateTime::parse_from_str(s.trim(), CHECKPOINT_FORMAT)
            .map(Self)
            .map_err(|_| InvalidCheckpoint { raw: s.to_string() })
    }
}

impl Serialize for Checkpoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Checkpoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Identity a checkpoint is stored under (one per source/destination pair).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointKey(String);

impl CheckpointKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CheckpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for CheckpointKey {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}
