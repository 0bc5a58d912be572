use std::collections::{HashMap, HashSet};

use photon_shared::{Coordinate, LinkSnapshot};
use tracing::debug;

use crate::meta_cache::MetadataCache;
use crate::route::RouteSelection;
use crate::style::{LinkStyle, ViewMode, link_style};
use crate::surface::RenderSurface;

/// Rendered state of one link as last written to the surface.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayEntity {
    pub style: LinkStyle,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OverlayInstruction {
    Create {
        id: String,
        coordinates: Vec<Coordinate>,
        style: LinkStyle,
        visible: bool,
    },
    Restyle {
        id: String,
        style: LinkStyle,
    },
    SetVisible {
        id: String,
        visible: bool,
    },
    Remove {
        id: String,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct StyleContext<'a> {
    pub mode: ViewMode,
    pub route: &'a RouteSelection,
}

impl StyleContext<'_> {
    /// Focus mode hides every link outside the active route.
    pub fn link_visible(&self, id: &str) -> bool {
        !self.route.is_focused() || self.route.is_active(id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub created: usize,
    pub restyled: usize,
    pub visibility: usize,
    pub removed: usize,
}

impl ApplyStats {
    pub fn writes(&self) -> usize {
        self.created + self.restyled + self.visibility + self.removed
    }
}

/// Computes the instructions that bring the overlay in line with `links`.
///
/// `links` must already be merged with `cache`. Ids repeated within one
/// snapshot are only considered once. When `is_full` is set, entities whose
/// id does not appear in `links` are removed; partial snapshots never prune.
pub fn diff(
    links: &[LinkSnapshot],
    is_full: bool,
    cache: &MetadataCache,
    table: &OverlayTable,
    ctx: StyleContext<'_>,
) -> Vec<OverlayInstruction> {
    let mut instructions = Vec::new();
    let mut seen: HashSet<&str> = HashSet::with_capacity(links.len());

    for link in links {
        if !seen.insert(link.id.as_str()) {
            debug!(id = %link.id, "duplicate link id in snapshot ignored");
            continue;
        }

        let style = link_style(link, ctx.mode, ctx.route);
        match table.get(&link.id) {
            Some(entity) => {
                if entity.style != style {
                    instructions.push(OverlayInstruction::Restyle {
                        id: link.id.clone(),
                        style,
                    });
                }
            }
            None => {
                let Some(meta) = cache.get(&link.id) else {
                    continue;
                };
                instructions.push(OverlayInstruction::Create {
                    id: link.id.clone(),
                    coordinates: meta.coordinates.clone(),
                    style,
                    visible: ctx.link_visible(&link.id),
                });
            }
        }
    }

    if is_full {
        let mut stale: Vec<&String> = table
            .entities
            .keys()
            .filter(|id| !seen.contains(id.as_str()))
            .collect();
        stale.sort();
        instructions.extend(
            stale
                .into_iter()
                .map(|id| OverlayInstruction::Remove { id: id.clone() }),
        );
    }

    instructions
}

/// Visibility changes needed so only route links show in focus mode.
pub fn focus_diff(table: &OverlayTable, ctx: StyleContext<'_>) -> Vec<OverlayInstruction> {
    let mut instructions: Vec<OverlayInstruction> = table
        .entities
        .iter()
        .filter_map(|(id, entity)| {
            let visible = ctx.link_visible(id);
            (entity.visible != visible).then(|| OverlayInstruction::SetVisible {
                id: id.clone(),
                visible,
            })
        })
        .collect();
    instructions.sort_by(|a, b| instruction_id(a).cmp(instruction_id(b)));
    instructions
}

fn instruction_id(instruction: &OverlayInstruction) -> &str {
    match instruction {
        OverlayInstruction::Create { id, .. }
        | OverlayInstruction::Restyle { id, .. }
        | OverlayInstruction::SetVisible { id, .. }
        | OverlayInstruction::Remove { id } => id,
    }
}

/// Overlay entities keyed by link id. The stored style mirrors exactly what
/// was last written to the surface.
#[derive(Debug, Default)]
pub struct OverlayTable {
    entities: HashMap<String, OverlayEntity>,
}

impl OverlayTable {
    pub fn get(&self, id: &str) -> Option<&OverlayEntity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Executes instructions in order, updating the diff cache on every write.
    pub fn apply<S: RenderSurface + ?Sized>(
        &mut self,
        instructions: Vec<OverlayInstruction>,
        surface: &mut S,
    ) -> ApplyStats {
        let mut stats = ApplyStats::default();
        for instruction in instructions {
            match instruction {
                OverlayInstruction::Create {
                    id,
                    coordinates,
                    style,
                    visible,
                } => {
                    if self.entities.contains_key(&id) {
                        debug!(%id, "create skipped for existing link");
                        continue;
                    }
                    surface.create_link(&id, &coordinates, &style);
                    if !visible {
                        surface.set_link_visible(&id, false);
                    }
                    self.entities.insert(id, OverlayEntity { style, visible });
                    stats.created += 1;
                }
                OverlayInstruction::Restyle { id, style } => {
                    let Some(entity) = self.entities.get_mut(&id) else {
                        continue;
                    };
                    if entity.style == style {
                        continue;
                    }
                    surface.restyle_link(&id, &style);
                    entity.style = style;
                    stats.restyled += 1;
                }
                OverlayInstruction::SetVisible { id, visible } => {
                    let Some(entity) = self.entities.get_mut(&id) else {
                        continue;
                    };
                    if entity.visible == visible {
                        continue;
                    }
                    surface.set_link_visible(&id, visible);
                    entity.visible = visible;
                    stats.visibility += 1;
                }
                OverlayInstruction::Remove { id } => {
                    if self.entities.remove(&id).is_some() {
                        surface.remove_link(&id);
                        stats.removed += 1;
                    }
                }
            }
        }
        stats
    }
}

/// Outcome of one [`reconcile`] pass.
#[derive(Debug, Clone, Default)]
pub struct Reconciled {
    /// Snapshot entries after merging with the metadata cache.
    pub links: Vec<LinkSnapshot>,
    /// Ids whose geometry is still unknown.
    pub missing_geometry: Vec<String>,
    pub stats: ApplyStats,
}

/// Merge, diff, write, prune: one complete reconciliation of a snapshot.
pub fn reconcile<S: RenderSurface + ?Sized>(
    snapshot: Vec<LinkSnapshot>,
    is_full: bool,
    cache: &mut MetadataCache,
    table: &mut OverlayTable,
    ctx: StyleContext<'_>,
    surface: &mut S,
) -> Reconciled {
    let mut missing_geometry = Vec::new();
    let links: Vec<LinkSnapshot> = snapshot
        .into_iter()
        .map(|link| {
            let merged = cache.merge(link);
            if merged.cache_miss {
                missing_geometry.push(merged.link.id.clone());
            }
            merged.link
        })
        .collect();

    let instructions = diff(&links, is_full, cache, table, ctx);
    let stats = table.apply(instructions, surface);

    Reconciled {
        links,
        missing_geometry,
        stats,
    }
}
