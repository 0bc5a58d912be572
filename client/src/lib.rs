pub mod api;
pub mod chart;
pub mod config;
pub mod engine;
pub mod error;
pub mod markers;
pub mod meta_cache;
pub mod overlay;
pub mod route;
pub mod scheduler;
pub mod style;
pub mod summary;
pub mod surface;

#[cfg(test)]
mod testing;

pub use api::{Backend, HttpBackend};
pub use config::ClientConfig;
pub use engine::Engine;
pub use error::ClientError;
pub use route::{RouteEffect, RouteEvent, RoutePhase, RouteSelection};
pub use scheduler::{PollKind, TickOutcome};
pub use style::ViewMode;
pub use surface::{RenderSurface, TracingSurface};
