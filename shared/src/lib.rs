pub mod geometry;
pub mod history;
pub mod link;
pub mod route;
pub mod telemetry;

pub use geometry::{Coordinate, center_point, polyline_length_m};
pub use history::{HistoryPoint, from_unix_seconds};
pub use link::*;
pub use route::*;
pub use telemetry::*;
