use serde::{Deserialize, Serialize};

use crate::geometry::Coordinate;

/// Congestion index above which the backend reports a link as congested.
pub const CONGESTED_CI: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    #[default]
    Road,
    Transit,
}

impl LinkType {
    /// Unknown or missing type strings collapse to `Road`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|value| value.trim().to_ascii_lowercase()) {
            Some(value) if value == "transit" => Self::Transit,
            _ => Self::Road,
        }
    }

    pub const fn is_transit(self) -> bool {
        matches!(self, Self::Transit)
    }
}

/// One link entry as it arrives on the wire. Every field is optional so a
/// single malformed entry never fails the whole frame.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLinkSnapshot {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub link_type: Option<String>,
    #[serde(default)]
    pub flow: Option<f64>,
    #[serde(default)]
    pub capacity: Option<f64>,
    #[serde(default)]
    pub ci: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub is_live: Option<bool>,
    #[serde(default)]
    pub last_observation_source: Option<String>,
    #[serde(default)]
    pub age_sec: Option<f64>,
    #[serde(default)]
    pub coordinates: Option<Vec<Coordinate>>,
}

/// A validated snapshot of one link, superseded by the next poll.
///
/// `name` and `link_type` are `None` when the frame omitted them; the client
/// fills them from its metadata cache.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LinkSnapshot {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub link_type: Option<LinkType>,
    #[serde(default)]
    pub flow: f64,
    #[serde(default)]
    pub capacity: f64,
    #[serde(default, rename = "ci")]
    pub congestion_index: f64,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub is_live: bool,
    #[serde(default)]
    pub last_observation_source: Option<String>,
    #[serde(default)]
    pub age_sec: Option<f64>,
    #[serde(default)]
    pub coordinates: Option<Vec<Coordinate>>,
}

impl RawLinkSnapshot {
    /// Returns `None` for entries without a usable id.
    pub fn into_snapshot(self) -> Option<LinkSnapshot> {
        let id = self.id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty())?;
        let link_type = self
            .link_type
            .as_deref()
            .map(|raw| LinkType::parse(Some(raw)));
        Some(LinkSnapshot {
            id,
            name: self.name,
            link_type,
            flow: self.flow.unwrap_or_default(),
            capacity: self.capacity.unwrap_or_default(),
            congestion_index: self.ci.unwrap_or_default().clamp(0.0, 1.0),
            price: self.price.unwrap_or_default(),
            is_live: self.is_live.unwrap_or(false),
            last_observation_source: self.last_observation_source,
            age_sec: self.age_sec,
            coordinates: self.coordinates.filter(|coords| !coords.is_empty()),
        })
    }
}

/// Parse wire entries one by one into valid snapshots, returning the number
/// of entries dropped for a missing id or an unreadable shape.
pub fn parse_links(values: Vec<serde_json::Value>) -> (Vec<LinkSnapshot>, usize) {
    let total = values.len();
    let links: Vec<LinkSnapshot> = values
        .into_iter()
        .filter_map(|value| serde_json::from_value::<RawLinkSnapshot>(value).ok())
        .filter_map(RawLinkSnapshot::into_snapshot)
        .collect();
    let dropped = total - links.len();
    (links, dropped)
}

/// Catalogue entry from the link registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub link_type: LinkType,
    #[serde(default)]
    pub coordinates: Vec<Coordinate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkRegistry {
    #[serde(default)]
    pub links: Vec<LinkRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveLinks {
    #[serde(default)]
    pub live_mode_links: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unknown_links: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveLinksUpdate {
    #[serde(default)]
    pub link_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl LiveLinksUpdate {
    pub fn only(link_ids: Vec<String>) -> Self {
        Self {
            link_ids,
            mode: None,
        }
    }

    pub fn all() -> Self {
        Self {
            link_ids: Vec::new(),
            mode: Some("all".to_string()),
        }
    }
}
