//! Position filtering for indoor/outdoor tracking on noisy geolocation.
//!
//! Raw browser/device fixes jitter by tens of meters indoors; this crate
//! turns them into a stable marker. [`pipeline::PositionPipeline`] is the
//! entry point: it gates each sample on accuracy, geofence and implied
//! speed, runs the survivors through a low-pass → median → Kalman cascade
//! with jump handling, and emits [`types::FilteredPosition`] values carrying
//! jump/fallback/rejection flags and a confidence score.
//!
//! Around the core pipeline: [`floors::FloorLocator`] resolves altitudes to
//! venue floors and snaps positions to surveyed doors, and
//! [`route::RoutePolyline`] projects a live position onto a planned route.

pub mod filters;
pub mod floors;
pub mod geodesy;
pub mod geofence;
pub mod jump;
pub mod motion;
pub mod pipeline;
pub mod reliability;
pub mod route;
pub mod types;

pub use floors::{DoorMatch, DoorSegment, Floor, FloorLocator};
pub use geofence::Geofence;
pub use pipeline::{PipelineConfig, PositionPipeline};
pub use route::{RoutePolyline, RouteProgress};
pub use types::{DeviceClass, FilteredPosition, FilterStats, RawSample};
