use std::time::Duration;

use crate::style::ViewMode;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

pub const DEFAULT_FULL_POLL_MS: u64 = 1500;
pub const DEFAULT_FULL_POLL_ROUTE_MS: u64 = 4000;
pub const DEFAULT_ROUTE_POLL_MS: u64 = 2000;
pub const DEFAULT_CHART_POLL_MS: u64 = 5000;
pub const DEFAULT_SUMMARY_REFRESH_MS: u64 = 3000;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 3;

/// Granularity of the orchestrator's wake-up loop.
pub const SCHEDULER_RESOLUTION_MS: u64 = 100;
pub const CHART_HISTORY_CAPACITY: usize = 60;

fn env_millis(name: &str, default_ms: u64) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_millis(default_ms))
}

fn env_secs(name: &str, default_secs: u64) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
        })
        .unwrap_or(default)
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn api_url() -> String {
    env_nonempty("PHOTON_API_URL")
        .map(|url| url.trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string())
}

pub fn full_poll_interval() -> Duration {
    env_millis("PHOTON_FULL_POLL_MS", DEFAULT_FULL_POLL_MS)
}

/// Never faster than the base full-state cadence.
pub fn full_poll_interval_while_routed() -> Duration {
    env_millis("PHOTON_FULL_POLL_ROUTE_MS", DEFAULT_FULL_POLL_ROUTE_MS).max(full_poll_interval())
}

pub fn route_poll_interval() -> Duration {
    env_millis("PHOTON_ROUTE_POLL_MS", DEFAULT_ROUTE_POLL_MS)
}

pub fn chart_poll_interval() -> Duration {
    env_millis("PHOTON_CHART_POLL_MS", DEFAULT_CHART_POLL_MS)
}

pub fn summary_refresh_interval() -> Duration {
    env_millis("PHOTON_SUMMARY_REFRESH_MS", DEFAULT_SUMMARY_REFRESH_MS)
}

pub fn http_timeout() -> Duration {
    env_secs("PHOTON_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)
}

pub fn connect_timeout() -> Duration {
    env_secs("PHOTON_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)
}

pub fn view_mode() -> ViewMode {
    match env_nonempty("PHOTON_VIEW_MODE")
        .map(|value| value.to_ascii_lowercase())
        .as_deref()
    {
        Some("simulation") | Some("sim") => ViewMode::Simulation,
        _ => ViewMode::Live,
    }
}

pub fn show_markers() -> bool {
    env_flag("PHOTON_SHOW_MARKERS", true)
}

/// Route the headless binary plans and activates after its first poll.
pub fn preset_route() -> Option<(String, String)> {
    Some((env_nonempty("PHOTON_ROUTE_START")?, env_nonempty("PHOTON_ROUTE_END")?))
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollIntervals {
    pub full: Duration,
    pub full_while_routed: Duration,
    pub route: Duration,
    pub chart: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            full: Duration::from_millis(DEFAULT_FULL_POLL_MS),
            full_while_routed: Duration::from_millis(DEFAULT_FULL_POLL_ROUTE_MS),
            route: Duration::from_millis(DEFAULT_ROUTE_POLL_MS),
            chart: Duration::from_millis(DEFAULT_CHART_POLL_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub api_url: String,
    pub intervals: PollIntervals,
    pub summary_refresh: Duration,
    pub http_timeout: Duration,
    pub connect_timeout: Duration,
    pub view_mode: ViewMode,
    pub show_markers: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            intervals: PollIntervals::default(),
            summary_refresh: Duration::from_millis(DEFAULT_SUMMARY_REFRESH_MS),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            view_mode: ViewMode::Live,
            show_markers: true,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self {
            api_url: api_url(),
            intervals: PollIntervals {
                full: full_poll_interval(),
                full_while_routed: full_poll_interval_while_routed(),
                route: route_poll_interval(),
                chart: chart_poll_interval(),
            },
            summary_refresh: summary_refresh_interval(),
            http_timeout: http_timeout(),
            connect_timeout: connect_timeout(),
            view_mode: view_mode(),
            show_markers: show_markers(),
        }
    }
}
