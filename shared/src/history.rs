use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One sample of the backend's network-wide history series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// Unix seconds.
    pub timestamp: f64,
    #[serde(default)]
    pub avg_ci: f64,
    #[serde(default)]
    pub total_flow: f64,
    #[serde(default)]
    pub sensitivity: f64,
}

/// Converts fractional unix seconds as sent by the backend.
pub fn from_unix_seconds(timestamp: f64) -> Option<DateTime<Utc>> {
    if !timestamp.is_finite() {
        return None;
    }
    let secs = timestamp.floor();
    let nanos = ((timestamp - secs) * 1e9).round() as u32;
    DateTime::from_timestamp(secs as i64, nanos.min(999_999_999))
}

impl HistoryPoint {
    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        from_unix_seconds(self.timestamp)
    }
}
