//! Feed message filtering and normalization

use chrono::{DateTime, Timelike, Utc};
use tracing::{debug, info};

use crate::{
    errors::AisStreamerError,
    models::{FeedEnvelope, Mmsi, PositionReport, TrackedMmsis, POSITION_REPORT},
};

/// Upstream timestamp layout, e.g. `2024-01-02 03:04:05.678901 +0000 UTC`
const FEED_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f %z UTC";

/// Turns raw feed payloads into position reports of tracked vessels
#[derive(Debug, Clone)]
pub struct MessageFilter {
    tracked: TrackedMmsis,
}

impl MessageFilter {
    pub fn new(tracked: TrackedMmsis) -> Self {
        Self { tracked }
    }

    /// Parse one raw feed message
    ///
    /// `Ok(None)` means the message was skipped: wrong message type,
    /// untracked vessel, or missing coordinates. Malformed payloads are
    /// errors, to be logged and dropped by the caller.
    pub fn filter(&self, payload: &[u8]) -> Result<Option<PositionReport>, AisStreamerError> {
        let envelope: FeedEnvelope = serde_json::from_slice(payload)?;

        if envelope.message_type.as_deref() != Some(POSITION_REPORT) {
            debug!("Ignoring message type {:?}", envelope.message_type);
            return Ok(None);
        }

        let body = envelope
            .message
            .and_then(|message| message.position_report)
            .unwrap_or_default();
        let meta = envelope.meta_data.unwrap_or_default();

        let identifier = body
            .identifier()
            .ok_or(AisStreamerError::MissingIdentifier)?;

        // Out-of-range identifiers can never be tracked
        let mmsi = match Mmsi::try_from(identifier) {
            Ok(mmsi) if self.tracked.contains(mmsi) => mmsi,
            _ => {
                debug!(mmsi = identifier, "Skipped: vessel is not tracked");
                return Ok(None);
            }
        };

        let (lat, lon) = match (body.latitude, body.longitude) {
            (Some(lat), Some(lon)) => (lat, lon),
            (lat, lon) => {
                info!(%mmsi, name = %meta.ship_name, ?lat, ?lon, "Skipped: position incomplete");
                return Ok(None);
            }
        };

        let timestamp = match meta.time_utc.as_deref() {
            Some(raw) if !raw.trim().is_empty() => Some(normalize_timestamp(raw)?),
            _ => None,
        };

        Ok(Some(PositionReport {
            mmsi,
            lat,
            lon,
            cog: body.cog,
            sog: body.sog,
            timestamp,
            name: meta.ship_name,
        }))
    }
}

/// Parse an upstream timestamp, truncated to whole seconds in UTC
pub fn normalize_timestamp(raw: &str) -> Result<DateTime<Utc>, AisStreamerError> {
    DateTime::parse_from_str(raw.trim(), FEED_TIME_FORMAT)
        .ok()
        .and_then(|time| time.with_timezone(&Utc).with_nanosecond(0))
        .ok_or_else(|| AisStreamerError::InvalidTimestamp(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TIMESTAMP_FORMAT;
    use serde_json::json;

    fn filter() -> MessageFilter {
        let tracked = [563242500u32, 636020973]
            .into_iter()
            .map(|v| Mmsi::try_from(v).unwrap())
            .collect();
        MessageFilter::new(tracked)
    }

    fn position_message(mmsi: u64, lat: Option<f64>, lon: Option<f64>) -> Vec<u8> {
        json!({
            "MessageType": "PositionReport",
            "Message": {
                "PositionReport": {
                    "UserID": mmsi,
                    "Latitude": lat,
                    "Longitude": lon,
                    "Cog": 120.5,
                    "Sog": 12.1
                }
            },
            "MetaData": {
                "time_utc": "2024-01-02 03:04:05.678901 +0000 UTC",
                "ShipName": "  EVER GIVEN "
            }
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn other_message_types_are_skipped() {
        for message_type in ["ShipStaticData", "StandardClassBPositionReport", ""] {
            let payload = json!({
                "MessageType": message_type,
                "Message": {},
                "MetaData": {}
            })
            .to_string();
            assert_eq!(filter().filter(payload.as_bytes()).unwrap(), None);
        }
    }

    #[test]
    fn untracked_vessel_is_skipped() {
        let payload = position_message(230123456, Some(60.0), Some(24.9));
        assert_eq!(filter().filter(&payload).unwrap(), None);

        let payload = position_message(1_000_000_000, Some(60.0), Some(24.9));
        assert_eq!(filter().filter(&payload).unwrap(), None);

        let payload = position_message(u64::MAX, Some(60.0), Some(24.9));
        assert_eq!(filter().filter(&payload).unwrap(), None);
    }

    #[test]
    fn missing_coordinate_is_skipped() {
        let payload = position_message(563242500, None, Some(24.9));
        assert_eq!(filter().filter(&payload).unwrap(), None);

        let payload = position_message(563242500, Some(60.0), None);
        assert_eq!(filter().filter(&payload).unwrap(), None);
    }

    #[test]
    fn tracked_vessel_produces_report() {
        let payload = position_message(563242500, Some(1.25), Some(103.75));
        let report = filter().filter(&payload).unwrap().unwrap();

        assert_eq!(report.mmsi.value(), 563242500);
        assert_eq!(report.lat, 1.25);
        assert_eq!(report.lon, 103.75);
        assert_eq!(report.cog, Some(120.5));
        assert_eq!(report.sog, Some(12.1));
        assert_eq!(report.name, "EVER GIVEN");
        assert_eq!(
            report.timestamp_string().as_deref(),
            Some("2024-01-02T03:04:05Z")
        );
    }

    #[test]
    fn mmsi_field_is_accepted() {
        let payload = json!({
            "MessageType": "PositionReport",
            "Message": {
                "PositionReport": { "MMSI": 636020973, "Latitude": 5.0, "Longitude": 6.0 }
            },
            "MetaData": {}
        })
        .to_string();
        let report = filter().filter(payload.as_bytes()).unwrap().unwrap();

        assert_eq!(report.mmsi.value(), 636020973);
        assert_eq!(report.timestamp, None);
        assert_eq!(report.name, "");
        assert_eq!(report.cog, None);
    }

    #[test]
    fn malformed_payloads_are_errors() {
        assert!(matches!(
            filter().filter(b"{not json"),
            Err(AisStreamerError::SerdeError(_))
        ));

        let wrong_type = json!({
            "MessageType": "PositionReport",
            "Message": { "PositionReport": { "UserID": 563242500, "Latitude": "north" } }
        })
        .to_string();
        assert!(filter().filter(wrong_type.as_bytes()).is_err());

        let no_identifier = json!({
            "MessageType": "PositionReport",
            "Message": { "PositionReport": { "Latitude": 1.0, "Longitude": 2.0 } }
        })
        .to_string();
        assert!(matches!(
            filter().filter(no_identifier.as_bytes()),
            Err(AisStreamerError::MissingIdentifier)
        ));
    }

    #[test]
    fn timestamp_normalization() {
        let time = normalize_timestamp("2024-01-02 03:04:05.678901 +0000 UTC").unwrap();
        assert_eq!(time.format(TIMESTAMP_FORMAT).to_string(), "2024-01-02T03:04:05Z");

        let time = normalize_timestamp("2025-03-09 23:59:59.999999999 +0000 UTC").unwrap();
        assert_eq!(time.format(TIMESTAMP_FORMAT).to_string(), "2025-03-09T23:59:59Z");

        assert!(matches!(
            normalize_timestamp("yesterday"),
            Err(AisStreamerError::InvalidTimestamp(_))
        ));
    }
}
