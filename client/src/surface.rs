use photon_shared::Coordinate;
use tracing::debug;

use crate::style::LinkStyle;

/// Drawing target for overlay links and live markers.
///
/// A link is drawn as two layers (core and glow); how the surface realises
/// them is its own business. The reconciler and marker manager are the only
/// callers.
pub trait RenderSurface {
    fn create_link(&mut self, id: &str, coordinates: &[Coordinate], style: &LinkStyle);
    fn restyle_link(&mut self, id: &str, style: &LinkStyle);
    fn remove_link(&mut self, id: &str);
    fn set_link_visible(&mut self, id: &str, visible: bool);

    fn place_marker(&mut self, id: &str, position: Coordinate, stale: bool);
    fn update_marker(&mut self, id: &str, position: Coordinate, stale: bool);
    fn remove_marker(&mut self, id: &str);
}

/// Surface that only logs what it is asked to draw. Used by the headless
/// binary.
#[derive(Debug, Default)]
pub struct TracingSurface {
    links: usize,
    markers: usize,
}

impl TracingSurface {
    pub fn link_count(&self) -> usize {
        self.links
    }

    pub fn marker_count(&self) -> usize {
        self.markers
    }
}

impl RenderSurface for TracingSurface {
    fn create_link(&mut self, id: &str, coordinates: &[Coordinate], style: &LinkStyle) {
        self.links += 1;
        debug!(id, points = coordinates.len(), color = style.color, "create link");
    }

    fn restyle_link(&mut self, id: &str, style: &LinkStyle) {
        debug!(
            id,
            color = style.color,
            glow = style.glow_color,
            weight = style.weight,
            "restyle link"
        );
    }

    fn remove_link(&mut self, id: &str) {
        self.links = self.links.saturating_sub(1);
        debug!(id, "remove link");
    }

    fn set_link_visible(&mut self, id: &str, visible: bool) {
        debug!(id, visible, "link visibility");
    }

    fn place_marker(&mut self, id: &str, position: Coordinate, stale: bool) {
        self.markers += 1;
        debug!(id, lat = position[0], lon = position[1], stale, "place marker");
    }

    fn update_marker(&mut self, id: &str, position: Coordinate, stale: bool) {
        debug!(id, lat = position[0], lon = position[1], stale, "update marker");
    }

    fn remove_marker(&mut self, id: &str) {
        self.markers = self.markers.saturating_sub(1);
        debug!(id, "remove marker");
    }
}
