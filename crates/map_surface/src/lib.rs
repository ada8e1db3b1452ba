//! Seam between the reconciler and whatever mapping widget renders the markers.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use shared::domain::LatLng;
use thiserror::Error;

pub mod memory;

pub use memory::{InMemoryHost, SurfaceInspector};

/// Zoom level used when there is nothing to frame.
pub const WORLD_VIEW_ZOOM: u8 = 1;

const DEFAULT_TILE_URL: &str = "https://api.tiles.mapbox.com/v4/{id}/{z}/{x}/{y}.png";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MarkerKey(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Icon {
    Default,
    Selected,
}

impl Icon {
    pub const fn for_selection(selected: bool) -> Self {
        if selected {
            Self::Selected
        } else {
            Self::Default
        }
    }

    pub const fn retina_url(self) -> &'static str {
        match self {
            Self::Default => "default@2x.png",
            Self::Selected => "selected@2x.png",
        }
    }

    /// Width and height in CSS pixels.
    pub const fn size(self) -> (u32, u32) {
        (35, 46)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurfaceOptions {
    pub target: String,
    pub initial_center: LatLng,
    pub initial_zoom: u8,
    pub max_zoom: u8,
    pub tile_url: String,
    pub tile_set: String,
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self {
            target: "map".into(),
            initial_center: LatLng::new(50.0, 50.0),
            initial_zoom: 3,
            max_zoom: 10,
            tile_url: DEFAULT_TILE_URL.into(),
            tile_set: "mapbox.streets".into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("unknown marker handle {0:?}")]
    UnknownMarker(MarkerKey),
    #[error("invalid coordinates ({lat}, {lng})")]
    InvalidCoordinates { lat: f64, lng: f64 },
    #[error("surface has been destroyed")]
    Destroyed,
    #[error("map backend failure: {0}")]
    Backend(String),
}

pub type ClickCallback = Arc<dyn Fn() + Send + Sync>;

/// A live map widget bound to a render target.
///
/// Marker handles are keys issued by the surface; every per-marker operation
/// goes through the surface that issued the key.
pub trait MapSurface: Send {
    fn add_marker(&mut self, position: LatLng) -> Result<MarkerKey, SurfaceError>;
    fn set_position(&mut self, key: MarkerKey, position: LatLng) -> Result<(), SurfaceError>;
    fn set_icon(&mut self, key: MarkerKey, icon: Icon) -> Result<(), SurfaceError>;
    fn on_click(&mut self, key: MarkerKey, callback: ClickCallback) -> Result<(), SurfaceError>;
    fn remove_marker(&mut self, key: MarkerKey) -> Result<(), SurfaceError>;
    fn fit_to_markers(&mut self, positions: &[LatLng]) -> Result<(), SurfaceError>;
    fn center_on(&mut self, position: LatLng) -> Result<(), SurfaceError>;
    fn set_zoom(&mut self, level: u8) -> Result<(), SurfaceError>;
    /// Whether the viewport has been framed around markers yet.
    fn has_bounds(&self) -> bool;
    fn destroy(&mut self) -> Result<(), SurfaceError>;
}

/// Environment hosting render targets, e.g. a document the view inserts elements into.
#[async_trait]
pub trait RenderHost: Send + Sync {
    async fn has_target(&self, target: &str) -> bool;
    fn create_surface(&self, options: &SurfaceOptions) -> Result<Box<dyn MapSurface>, SurfaceError>;
}
