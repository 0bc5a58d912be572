use photon_shared::{LinkSnapshot, LinkType};

use crate::route::RouteSelection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    /// Emphasise links fed by live observations.
    #[default]
    Live,
    /// Emphasise links driven by the simulation.
    Simulation,
}

/// Style written to the render surface. Doubles as the per-entity diff cache.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkStyle {
    pub color: &'static str,
    pub glow_color: &'static str,
    pub weight: f64,
    pub opacity: f64,
    pub glow_opacity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CongestionBucket {
    Neutral,
    Warn1,
    Warn2,
    Danger,
}

impl CongestionBucket {
    pub fn from_ci(ci: f64) -> Self {
        if ci > 0.8 {
            Self::Danger
        } else if ci > 0.6 {
            Self::Warn2
        } else if ci > 0.4 {
            Self::Warn1
        } else {
            Self::Neutral
        }
    }

    pub const fn color(self) -> &'static str {
        match self {
            Self::Neutral => palette::NEUTRAL,
            Self::Warn1 => palette::WARN_1,
            Self::Warn2 => palette::WARN_2,
            Self::Danger => palette::DANGER,
        }
    }

    pub const fn weight(self) -> f64 {
        match self {
            Self::Neutral => 3.0,
            Self::Warn1 => 4.0,
            Self::Warn2 => 5.0,
            Self::Danger => 6.0,
        }
    }

    const fn glow_opacity(self) -> f64 {
        match self {
            Self::Neutral => 0.0,
            Self::Warn1 => 0.12,
            Self::Warn2 => 0.2,
            Self::Danger => 0.3,
        }
    }
}

pub mod palette {
    pub const DIM_ROAD: &str = "#4b5563";
    pub const DIM_TRANSIT: &str = "#64748b";
    pub const NEUTRAL: &str = "#22c55e";
    pub const WARN_1: &str = "#eab308";
    pub const WARN_2: &str = "#f97316";
    pub const DANGER: &str = "#ef4444";
    pub const TRANSIT: &str = "#3b82f6";
    pub const PLANNED_GLOW: &str = "#a855f7";
    pub const ACTIVE_GLOW: &str = "#06b6d4";
    pub const START: &str = "#10b981";
    pub const END: &str = "#f43f5e";
}

pub const DIM_OPACITY: f64 = 0.25;
pub const DIM_WEIGHT: f64 = 2.0;

pub const PLANNED_GLOW_OPACITY: f64 = 0.35;
pub const PLANNED_WEIGHT: f64 = 5.0;
pub const ACTIVE_GLOW_OPACITY: f64 = 0.45;
pub const ACTIVE_WEIGHT: f64 = 6.0;
pub const ENDPOINT_GLOW_OPACITY: f64 = 0.55;
pub const ENDPOINT_WEIGHT: f64 = 7.0;

/// Whether the link is emphasised in the current view mode.
pub fn is_highlighted(link: &LinkSnapshot, mode: ViewMode) -> bool {
    match mode {
        ViewMode::Live => link.is_live,
        ViewMode::Simulation => !link.is_live,
    }
}

fn base_style(link: &LinkSnapshot, mode: ViewMode) -> LinkStyle {
    let link_type = link.link_type.unwrap_or_default();

    if !is_highlighted(link, mode) {
        let color = match link_type {
            LinkType::Transit => palette::DIM_TRANSIT,
            LinkType::Road => palette::DIM_ROAD,
        };
        return LinkStyle {
            color,
            glow_color: color,
            weight: DIM_WEIGHT,
            opacity: DIM_OPACITY,
            glow_opacity: 0.0,
        };
    }

    let bucket = CongestionBucket::from_ci(link.congestion_index);
    let color = if link_type.is_transit() {
        palette::TRANSIT
    } else {
        bucket.color()
    };
    LinkStyle {
        color,
        glow_color: color,
        weight: bucket.weight(),
        opacity: 1.0,
        glow_opacity: bucket.glow_opacity(),
    }
}

/// Computes the target style for one link. Route overrides raise floors on
/// top of the congestion-derived base and never lower an earlier value.
pub fn link_style(link: &LinkSnapshot, mode: ViewMode, route: &RouteSelection) -> LinkStyle {
    let mut style = base_style(link, mode);
    let id = link.id.as_str();

    if route.is_planned(id) {
        style.glow_color = palette::PLANNED_GLOW;
        style.glow_opacity = style.glow_opacity.max(PLANNED_GLOW_OPACITY);
        style.weight = style.weight.max(PLANNED_WEIGHT);
    }

    if route.is_active(id) {
        style.glow_color = palette::ACTIVE_GLOW;
        style.glow_opacity = style.glow_opacity.max(ACTIVE_GLOW_OPACITY);
        style.weight = style.weight.max(ACTIVE_WEIGHT);
    }

    let is_start = route.start() == Some(id);
    let is_end = route.end() == Some(id);
    // A link cannot be both endpoints; such a selection gets neither override.
    match (is_start, is_end) {
        (true, false) => apply_endpoint(&mut style, palette::START),
        (false, true) => apply_endpoint(&mut style, palette::END),
        _ => {}
    }

    style
}

fn apply_endpoint(style: &mut LinkStyle, color: &'static str) {
    style.color = color;
    style.glow_color = color;
    style.opacity = 1.0;
    style.weight = style.weight.max(ENDPOINT_WEIGHT);
    style.glow_opacity = style.glow_opacity.max(ENDPOINT_GLOW_OPACITY);
}
