use crate::domain::reading::Reading;
use crate::domain::result::{DomainError, DomainResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One reading as it appears on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub sensor: String,
    pub temperature: f64,
}

impl From<&Reading> for Measurement {
    fn from(reading: &Reading) -> Self {
        Self {
            sensor: reading.sensor_id.clone(),
            temperature: reading.temperature,
        }
    }
}

/// One published telemetry message: zero or more readings plus metadata.
///
/// Field order is the wire key order; serde_json preserves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Device scope (`{registry_id}.{device_id}`) for traceability
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor_id: Option<String>,
    /// Globally-unique id, fresh per publish
    pub id: String,
    /// Event timestamp, UTC, second precision
    pub ts: String,
    pub data: Vec<Measurement>,
}

impl Envelope {
    /// Build the envelope for one publish cycle with a fresh UUIDv4 id
    pub fn new(device_scope: Option<String>, readings: &[Reading], now: DateTime<Utc>) -> Self {
        Self {
            sensor_id: device_scope,
            id: Uuid::new_v4().to_string(),
            ts: format_event_timestamp(now),
            data: readings.iter().map(Measurement::from).collect(),
        }
    }

    /// Serialize to the UTF-8 JSON wire form
    pub fn encode(&self) -> DomainResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| DomainError::EncodingFailure(e.to_string()))
    }
}

/// Format an event timestamp as UTC `YYYY-MM-DD HH:MM:SS`
pub fn format_event_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}
