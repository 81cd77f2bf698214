//! Data models.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AisStreamerError;
use serde_helpers::*;

/// Message type carrying vessel positions, both in subscriptions and in the feed
pub const POSITION_REPORT: &str = "PositionReport";

/// Format of timestamps stored in the backing store
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Maritime Mobile Service Identity (MMSI)
///
/// A unique nine-digit number for identifying vessels in AIS messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mmsi(u32);

impl TryFrom<u32> for Mmsi {
    type Error = AisStreamerError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if value > 999_999_999 {
            return Err(AisStreamerError::InvalidMmsi(value.to_string()));
        }
        Ok(Self(value))
    }
}

impl TryFrom<u64> for Mmsi {
    type Error = AisStreamerError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        let narrowed =
            u32::try_from(value).map_err(|_| AisStreamerError::InvalidMmsi(value.to_string()))?;
        Self::try_from(narrowed)
    }
}

impl TryFrom<&str> for Mmsi {
    type Error = AisStreamerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let parsed = value
            .parse::<u32>()
            .map_err(|_| AisStreamerError::InvalidMmsi(value.to_string()))?;
        Self::try_from(parsed)
    }
}

impl Mmsi {
    /// Get the raw MMSI value
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Mmsi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed set of vessels to capture
///
/// Used for the upstream subscription filter and again locally, since the
/// upstream filter is not trusted to be strict.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackedMmsis(BTreeSet<Mmsi>);

impl TrackedMmsis {
    pub fn contains(&self, mmsi: Mmsi) -> bool {
        self.0.contains(&mmsi)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// MMSIs in the string form expected by the subscription filter
    pub fn to_filter_strings(&self) -> Vec<String> {
        self.0.iter().map(Mmsi::to_string).collect()
    }
}

impl FromIterator<Mmsi> for TrackedMmsis {
    fn from_iter<I: IntoIterator<Item = Mmsi>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Normalized vessel position, built from one feed message
#[derive(Debug, Clone, PartialEq)]
pub struct PositionReport {
    pub mmsi: Mmsi,
    /// Latitude in WGS84 decimal degrees
    pub lat: f64,
    /// Longitude in WGS84 decimal degrees
    pub lon: f64,
    /// Course over ground in degrees
    pub cog: Option<f64>,
    /// Speed over ground in knots
    pub sog: Option<f64>,
    /// Report time, whole seconds
    pub timestamp: Option<DateTime<Utc>>,
    /// Trimmed ship name, empty if not available
    pub name: String,
}

impl PositionReport {
    /// Timestamp in the stored `YYYY-MM-DDTHH:MM:SSZ` form
    pub fn timestamp_string(&self) -> Option<String> {
        self.timestamp
            .map(|time| time.format(TIMESTAMP_FORMAT).to_string())
    }
}

/// Bounding box as `[[lon, lat], [lon, lat]]` corners
pub type BoundingBox = [[f64; 2]; 2];

/// The whole earth
pub const GLOBAL_BOUNDING_BOX: BoundingBox = [[-180.0, -90.0], [180.0, 90.0]];

/// Subscription sent to the feed after every connect
///
/// See: https://aisstream.io/documentation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subscription {
    #[serde(rename = "APIKey")]
    pub api_key: String,
    #[serde(rename = "BoundingBoxes")]
    pub bounding_boxes: Vec<BoundingBox>,
    #[serde(rename = "FilterShipMMSI")]
    pub filter_ship_mmsi: Vec<String>,
    #[serde(rename = "FilterMessageTypes")]
    pub filter_message_types: Vec<String>,
}

impl Subscription {
    /// Global subscription to position reports of the tracked vessels
    pub fn new(api_key: &str, tracked: &TrackedMmsis) -> Self {
        Self {
            api_key: api_key.to_string(),
            bounding_boxes: vec![GLOBAL_BOUNDING_BOX],
            filter_ship_mmsi: tracked.to_filter_strings(),
            filter_message_types: vec![POSITION_REPORT.to_string()],
        }
    }
}

/// Envelope of every feed message
///
/// The body is kept unparsed until the message type is known.
#[derive(Debug, Deserialize)]
pub struct FeedEnvelope {
    #[serde(rename = "MessageType", default)]
    pub message_type: Option<String>,
    #[serde(rename = "Message", default)]
    pub message: Option<FeedBody>,
    #[serde(rename = "MetaData", default)]
    pub meta_data: Option<FeedMetaData>,
}

#[derive(Debug, Deserialize)]
pub struct FeedBody {
    #[serde(rename = "PositionReport", default)]
    pub position_report: Option<RawPositionReport>,
}

/// Position report body as sent by the feed
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct RawPositionReport {
    #[serde(rename = "UserID", default)]
    pub user_id: Option<u64>,
    #[serde(rename = "MMSI", default)]
    pub mmsi: Option<u64>,
    #[serde(rename = "Latitude", default)]
    pub latitude: Option<f64>,
    #[serde(rename = "Longitude", default)]
    pub longitude: Option<f64>,
    #[serde(rename = "Cog", default)]
    pub cog: Option<f64>,
    #[serde(rename = "Sog", default)]
    pub sog: Option<f64>,
}

impl RawPositionReport {
    /// Identifier from `UserID`, falling back to `MMSI` when missing or zero
    pub fn identifier(&self) -> Option<u64> {
        self.user_id.filter(|&id| id != 0).or(self.mmsi)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct FeedMetaData {
    /// Upstream time, e.g. `2024-01-02 03:04:05.678901 +0000 UTC`
    #[serde(rename = "time_utc", default)]
    pub time_utc: Option<String>,
    #[serde(
        rename = "ShipName",
        default,
        deserialize_with = "deserialize_trimmed_string"
    )]
    pub ship_name: String,
}

/// Custom deserializers
mod serde_helpers {
    use serde::{self, Deserialize, Deserializer};

    pub fn deserialize_trimmed_string<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Option<String> = Option::deserialize(deserializer)?;
        Ok(s.map(|s| s.trim().to_string()).unwrap_or_default())
    }
}
