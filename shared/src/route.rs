use serde::{Deserialize, Serialize};

use crate::link::LinkSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePlanRequest {
    pub start_link_id: String,
    pub end_link_id: String,
}

/// Ordered links of a planned (not yet active) route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePlan {
    #[serde(default)]
    pub link_ids: Vec<String>,
    #[serde(default)]
    pub total_length_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteActivation {
    pub link_ids: Vec<String>,
    pub start_link_id: String,
    pub end_link_id: String,
    pub total_length_m: f64,
}

/// Server-canonical active route.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActiveRoute {
    #[serde(default)]
    pub link_ids: Vec<String>,
    #[serde(default)]
    pub total_length_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_link_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_link_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteActivationResponse {
    pub route: ActiveRoute,
}

/// Route-scoped poll payload. `active == false` means the route was cleared
/// elsewhere.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteLive {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub route: Option<ActiveRoute>,
    #[serde(default)]
    pub links: Option<Vec<serde_json::Value>>,
}

impl RouteLive {
    /// The route the client should adopt: `None` unless the server reports
    /// an active, non-empty route.
    pub fn effective_route(&self) -> Option<&ActiveRoute> {
        if !self.active {
            return None;
        }
        self.route.as_ref().filter(|route| !route.link_ids.is_empty())
    }

    pub fn take_links(&mut self) -> (Vec<LinkSnapshot>, usize) {
        crate::link::parse_links(self.links.take().unwrap_or_default())
    }
}
