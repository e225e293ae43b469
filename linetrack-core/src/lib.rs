//! linetrack-core: Pure route projection + vehicle tracking library for live
//! bus positions.
//!
//! No async, no I/O beyond the config file. The network feed, terminal and
//! web renderers live in `linetrack-server`, which drives a
//! [`LineTrackingSession`] from decoded [`VehicleFix`]es.

pub mod config;
pub mod feed;
pub mod format;
pub mod geo;
pub mod protocol;
pub mod render;
pub mod route;
pub mod session;
pub mod tracker;
pub mod types;

// Re-export commonly used types at crate root
pub use feed::{FeedInput, FeedLifecycle, FeedState};
pub use render::{RenderSink, Renderable, RouteWindow, TrackingSnapshot};
pub use route::{RouteModel, Station};
pub use session::{LineTrackingSession, TrackingOptions};
pub use tracker::{TrackerSettings, Vehicle, VehicleSnapshot};
pub use types::*;
