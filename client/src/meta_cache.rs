use std::collections::HashMap;

use photon_shared::{Coordinate, LinkRecord, LinkSnapshot, LinkType, center_point};

/// Static facts about one link, learned once and reused by later polls.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkMeta {
    pub name: Option<String>,
    pub link_type: Option<LinkType>,
    pub coordinates: Vec<Coordinate>,
    pub center: Option<Coordinate>,
}

/// Result of merging one snapshot with the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Merged {
    /// Snapshot with name/type filled from the cache and coordinates moved
    /// into the cache.
    pub link: LinkSnapshot,
    /// No geometry is known for this id yet.
    pub cache_miss: bool,
}

/// Per-link metadata keyed by id. Entries are created the first time
/// geometry is seen and are never removed during a session.
#[derive(Debug, Default)]
pub struct MetadataCache {
    entries: HashMap<String, LinkMeta>,
}

impl MetadataCache {
    pub fn get(&self, id: &str) -> Option<&LinkMeta> {
        self.entries.get(id)
    }

    pub fn center(&self, id: &str) -> Option<Coordinate> {
        self.entries.get(id).and_then(|meta| meta.center)
    }

    pub fn has_geometry(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn merge(&mut self, mut link: LinkSnapshot) -> Merged {
        let coordinates = link.coordinates.take().filter(|coords| !coords.is_empty());
        self.record(&link.id, link.name.as_deref(), link.link_type, coordinates);

        let cache_miss = match self.entries.get(&link.id) {
            Some(meta) => {
                if link.name.is_none() {
                    link.name = meta.name.clone();
                }
                if link.link_type.is_none() {
                    link.link_type = meta.link_type;
                }
                false
            }
            None => true,
        };

        Merged { link, cache_miss }
    }

    /// Seed the cache from a registry record.
    pub fn prime(&mut self, record: &LinkRecord) {
        let coordinates = Some(record.coordinates.clone()).filter(|coords| !coords.is_empty());
        let name = Some(record.name.as_str()).filter(|name| !name.is_empty());
        self.record(&record.id, name, Some(record.link_type), coordinates);
    }

    fn record(
        &mut self,
        id: &str,
        name: Option<&str>,
        link_type: Option<LinkType>,
        coordinates: Option<Vec<Coordinate>>,
    ) {
        match self.entries.get_mut(id) {
            Some(meta) => {
                if let Some(coordinates) = coordinates
                    && coordinates != meta.coordinates
                {
                    meta.center = center_point(&coordinates);
                    meta.coordinates = coordinates;
                }
            }
            None => {
                let Some(coordinates) = coordinates else {
                    return;
                };
                let center = center_point(&coordinates);
                self.entries.insert(
                    id.to_string(),
                    LinkMeta {
                        name: None,
                        link_type: None,
                        coordinates,
                        center,
                    },
                );
            }
        }

        let Some(entry) = self.entries.get_mut(id) else {
            return;
        };
        if let Some(name) = name
            && entry.name.as_deref() != Some(name)
        {
            entry.name = Some(name.to_string());
        }
        if link_type.is_some() && entry.link_type != link_type {
            entry.link_type = link_type;
        }
    }
}
