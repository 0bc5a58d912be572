use serde::{Deserialize, Serialize};

use chrono::{DateTime, Utc};

use crate::history::from_unix_seconds;
use crate::link::{LinkSnapshot, parse_links};

pub const DEFAULT_LIVE_STALE_THRESHOLD_SECS: f64 = 10.0;

fn default_stale_threshold() -> f64 {
    DEFAULT_LIVE_STALE_THRESHOLD_SECS
}

fn default_speed() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyParams {
    #[serde(default)]
    pub sensitivity: f64,
    #[serde(default)]
    pub aggressiveness: f64,
    #[serde(default = "default_stale_threshold")]
    pub live_stale_threshold_sec: f64,
}

impl Default for PolicyParams {
    fn default() -> Self {
        Self {
            sensitivity: 0.0,
            aggressiveness: 0.0,
            live_stale_threshold_sec: DEFAULT_LIVE_STALE_THRESHOLD_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlBlock {
    #[serde(default)]
    pub paused: bool,
    #[serde(default = "default_speed")]
    pub speed: f64,
}

impl Default for ControlBlock {
    fn default() -> Self {
        Self {
            paused: false,
            speed: 1.0,
        }
    }
}

/// One polled frame of the full network state.
///
/// `links` stays as raw JSON until [`TelemetryFrame::split_links`] so a
/// malformed entry costs only itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryFrame {
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default)]
    pub sim_time: Option<String>,
    #[serde(default)]
    pub weather: Option<String>,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub links: Vec<serde_json::Value>,
    #[serde(default)]
    pub policy: PolicyParams,
    #[serde(default)]
    pub control: ControlBlock,
}

/// Frame-level facts with the link list taken out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameHeader {
    pub timestamp: f64,
    pub sim_time: Option<String>,
    pub weather: Option<String>,
    pub events: Vec<String>,
    pub policy: PolicyParams,
    pub control: ControlBlock,
}

impl FrameHeader {
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        from_unix_seconds(self.timestamp)
    }
}

impl TelemetryFrame {
    /// Returns the header, the valid links and the count of dropped entries.
    pub fn split_links(self) -> (FrameHeader, Vec<LinkSnapshot>, usize) {
        let (links, dropped) = parse_links(self.links);
        let header = FrameHeader {
            timestamp: self.timestamp,
            sim_time: self.sim_time,
            weather: self.weather,
            events: self.events,
            policy: self.policy,
            control: self.control,
        };
        (header, links, dropped)
    }
}
