use std::collections::{HashMap, HashSet};

use photon_shared::{Coordinate, LinkSnapshot};
use tracing::debug;

use crate::meta_cache::MetadataCache;
use crate::surface::RenderSurface;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveMarker {
    pub position: Coordinate,
    pub stale: bool,
}

impl LiveMarker {
    pub fn new(position: Coordinate, age_sec: Option<f64>, threshold_sec: f64) -> Self {
        Self {
            position,
            stale: age_sec.is_some_and(|age| age > threshold_sec),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkerStats {
    pub placed: usize,
    pub updated: usize,
    pub removed: usize,
}

/// Point markers for links currently flagged live, keyed by link id.
#[derive(Debug, Default)]
pub struct MarkerTable {
    markers: HashMap<String, LiveMarker>,
}

impl MarkerTable {
    pub fn get(&self, id: &str) -> Option<&LiveMarker> {
        self.markers.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.markers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Bring markers in line with the live entries of `links`.
    ///
    /// A marker is kept only for live ids with a known center point. Writes
    /// happen only when position or staleness changed.
    pub fn sync<S: RenderSurface + ?Sized>(
        &mut self,
        links: &[LinkSnapshot],
        cache: &MetadataCache,
        stale_threshold_sec: f64,
        surface: &mut S,
    ) -> MarkerStats {
        let mut stats = MarkerStats::default();
        let mut keep: HashSet<&str> = HashSet::new();

        for link in links.iter().filter(|link| link.is_live) {
            let Some(center) = cache.center(&link.id) else {
                continue;
            };
            if !keep.insert(link.id.as_str()) {
                continue;
            }
            let target = LiveMarker::new(center, link.age_sec, stale_threshold_sec);
            match self.markers.get_mut(&link.id) {
                Some(current) if *current == target => {}
                Some(current) => {
                    surface.update_marker(&link.id, target.position, target.stale);
                    *current = target;
                    stats.updated += 1;
                }
                None => {
                    surface.place_marker(&link.id, target.position, target.stale);
                    self.markers.insert(link.id.clone(), target);
                    stats.placed += 1;
                }
            }
        }

        let mut gone: Vec<String> = self
            .markers
            .keys()
            .filter(|id| !keep.contains(id.as_str()))
            .cloned()
            .collect();
        gone.sort();
        for id in gone {
            self.markers.remove(&id);
            surface.remove_marker(&id);
            stats.removed += 1;
        }

        if stats != MarkerStats::default() {
            debug!(
                placed = stats.placed,
                updated = stats.updated,
                removed = stats.removed,
                "markers synced"
            );
        }
        stats
    }

    pub fn clear<S: RenderSurface + ?Sized>(&mut self, surface: &mut S) -> usize {
        let count = self.markers.len();
        for (id, _) in self.markers.drain() {
            surface.remove_marker(&id);
        }
        count
    }
}
