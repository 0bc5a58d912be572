use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use photon_shared::{CONGESTED_CI, FrameHeader, LinkSnapshot};

/// Coarse network figures shown beside the map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkSummary {
    pub links: usize,
    pub live: usize,
    pub stale_live: usize,
    pub congested: usize,
    pub mean_ci: f64,
    pub total_flow: f64,
    pub weather: Option<String>,
    pub sim_time: Option<String>,
    pub paused: bool,
    pub speed: f64,
    pub observed_at: Option<DateTime<Utc>>,
}

impl NetworkSummary {
    /// `stale_threshold_sec` is the same threshold the live markers use.
    pub fn compute(
        links: &[LinkSnapshot],
        header: &FrameHeader,
        stale_threshold_sec: f64,
    ) -> Self {
        let mut summary = Self {
            links: links.len(),
            weather: header.weather.clone(),
            sim_time: header.sim_time.clone(),
            paused: header.control.paused,
            speed: header.control.speed,
            observed_at: header.observed_at(),
            ..Self::default()
        };
        let mut ci_sum = 0.0;
        for link in links {
            ci_sum += link.congestion_index;
            summary.total_flow += link.flow;
            if link.congestion_index > CONGESTED_CI {
                summary.congested += 1;
            }
            if link.is_live {
                summary.live += 1;
                if link.age_sec.is_some_and(|age| age > stale_threshold_sec) {
                    summary.stale_live += 1;
                }
            }
        }
        if !links.is_empty() {
            summary.mean_ci = ci_sum / links.len() as f64;
        }
        summary
    }
}

/// Limits summary recomputation to one per `interval`.
#[derive(Debug, Clone)]
pub struct SummaryThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl SummaryThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Returns true, and starts a new window, if a refresh is allowed at `now`.
    pub fn ready(&mut self, now: Instant) -> bool {
        let due = self
            .last
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if due {
            self.last = Some(now);
        }
        due
    }
}
