//! Time and timestamp helpers.
//!
//! Payload timestamps travel over MQTT as fractional epoch seconds
//! (`"time_stamp": 1718000000.25`), so conversions live here.

use chrono::{DateTime, Utc};

/// UTC timestamp used for cycle start times, message arrival, etc.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Convert a timestamp to fractional seconds since the Unix epoch.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn epoch_seconds(ts: Timestamp) -> f64 {
    ts.timestamp_micros() as f64 / 1_000_000.0
}

/// Read a `time_stamp`-style field from a JSON value.
///
/// Accepts both numbers and numeric strings; anything else yields `None`.
#[must_use]
pub fn parse_epoch_seconds(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(number) => number.as_f64(),
        serde_json::Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
