//! Types shared between the map reconciler, the rendering surface seam and the replay tool.

pub mod domain;
pub mod error;
pub mod protocol;
pub mod snapshot;

pub use domain::{EventId, LatLng, Marker};
pub use snapshot::Snapshot;
