//! In-process surface that records what a real map widget would display.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use async_trait::async_trait;
use serde::Serialize;
use shared::domain::LatLng;
use tracing::debug;

use crate::{
    ClickCallback, Icon, MapSurface, MarkerKey, RenderHost, SurfaceError, SurfaceOptions,
    WORLD_VIEW_ZOOM,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl Bounds {
    fn around(positions: &[LatLng]) -> Option<Self> {
        let first = positions.first()?;
        let mut bounds = Self {
            south_west: *first,
            north_east: *first,
        };
        for position in &positions[1..] {
            bounds.south_west.lat = bounds.south_west.lat.min(position.lat);
            bounds.south_west.lng = bounds.south_west.lng.min(position.lng);
            bounds.north_east.lat = bounds.north_east.lat.max(position.lat);
            bounds.north_east.lng = bounds.north_east.lng.max(position.lng);
        }
        Some(bounds)
    }

    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south_west.lat + self.north_east.lat) / 2.0,
            (self.south_west.lng + self.north_east.lng) / 2.0,
        )
    }

    fn zoom_to_fit(&self, max_zoom: u8) -> u8 {
        let span = (self.north_east.lat - self.south_west.lat)
            .max(self.north_east.lng - self.south_west.lng);
        if span <= 0.0 {
            return max_zoom;
        }
        let zoom = (360.0 / span).log2().floor();
        zoom.clamp(f64::from(WORLD_VIEW_ZOOM), f64::from(max_zoom)) as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub center: LatLng,
    pub zoom: u8,
    pub bounds: Option<Bounds>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedMarker {
    pub position: LatLng,
    pub icon: Icon,
    pub clickable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SurfaceOp {
    AddMarker { key: MarkerKey },
    SetPosition { key: MarkerKey },
    SetIcon { key: MarkerKey, icon: Icon },
    RemoveMarker { key: MarkerKey },
    FitToMarkers { count: usize },
    CenterOn { position: LatLng },
    SetZoom { level: u8 },
    Destroy,
}

#[derive(Default)]
struct SurfaceState {
    markers: BTreeMap<MarkerKey, RenderedMarker>,
    callbacks: BTreeMap<MarkerKey, ClickCallback>,
    viewport: Option<Viewport>,
    ops: Vec<SurfaceOp>,
    next_key: u64,
    destroyed: bool,
}

fn lock(state: &Mutex<SurfaceState>) -> MutexGuard<'_, SurfaceState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Surface backed by plain memory. Cloning an inspector from it lets callers
/// observe the rendered state after the surface has been moved into a reconciler.
pub struct InMemorySurface {
    state: Arc<Mutex<SurfaceState>>,
    max_zoom: u8,
}

impl InMemorySurface {
    pub fn new(options: &SurfaceOptions) -> Self {
        let state = SurfaceState {
            viewport: Some(Viewport {
                center: options.initial_center,
                zoom: options.initial_zoom,
                bounds: None,
            }),
            ..SurfaceState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            max_zoom: options.max_zoom,
        }
    }

    pub fn inspector(&self) -> SurfaceInspector {
        SurfaceInspector {
            state: Arc::clone(&self.state),
        }
    }

    fn live(&self) -> Result<MutexGuard<'_, SurfaceState>, SurfaceError> {
        let guard = lock(&self.state);
        if guard.destroyed {
            return Err(SurfaceError::Destroyed);
        }
        Ok(guard)
    }
}

fn check_position(position: LatLng) -> Result<(), SurfaceError> {
    if position.is_finite() {
        Ok(())
    } else {
        Err(SurfaceError::InvalidCoordinates {
            lat: position.lat,
            lng: position.lng,
        })
    }
}

impl MapSurface for InMemorySurface {
    fn add_marker(&mut self, position: LatLng) -> Result<MarkerKey, SurfaceError> {
        check_position(position)?;
        let mut state = self.live()?;
        let key = MarkerKey(state.next_key);
        state.next_key += 1;
        state.markers.insert(
            key,
            RenderedMarker {
                position,
                icon: Icon::Default,
                clickable: false,
            },
        );
        state.ops.push(SurfaceOp::AddMarker { key });
        debug!(key = key.0, lat = position.lat, lng = position.lng, "surface: marker added");
        Ok(key)
    }

    fn set_position(&mut self, key: MarkerKey, position: LatLng) -> Result<(), SurfaceError> {
        check_position(position)?;
        let mut state = self.live()?;
        let marker = state
            .markers
            .get_mut(&key)
            .ok_or(SurfaceError::UnknownMarker(key))?;
        marker.position = position;
        state.ops.push(SurfaceOp::SetPosition { key });
        Ok(())
    }

    fn set_icon(&mut self, key: MarkerKey, icon: Icon) -> Result<(), SurfaceError> {
        let mut state = self.live()?;
        let marker = state
            .markers
            .get_mut(&key)
            .ok_or(SurfaceError::UnknownMarker(key))?;
        marker.icon = icon;
        state.ops.push(SurfaceOp::SetIcon { key, icon });
        Ok(())
    }

    fn on_click(&mut self, key: MarkerKey, callback: ClickCallback) -> Result<(), SurfaceError> {
        let mut state = self.live()?;
        let marker = state
            .markers
            .get_mut(&key)
            .ok_or(SurfaceError::UnknownMarker(key))?;
        marker.clickable = true;
        state.callbacks.insert(key, callback);
        Ok(())
    }

    fn remove_marker(&mut self, key: MarkerKey) -> Result<(), SurfaceError> {
        let mut state = self.live()?;
        if state.markers.remove(&key).is_none() {
            return Err(SurfaceError::UnknownMarker(key));
        }
        state.callbacks.remove(&key);
        state.ops.push(SurfaceOp::RemoveMarker { key });
        debug!(key = key.0, "surface: marker removed");
        Ok(())
    }

    fn fit_to_markers(&mut self, positions: &[LatLng]) -> Result<(), SurfaceError> {
        for position in positions {
            check_position(*position)?;
        }
        let max_zoom = self.max_zoom;
        let mut state = self.live()?;
        let Some(bounds) = Bounds::around(positions) else {
            return Ok(());
        };
        state.viewport = Some(Viewport {
            center: bounds.center(),
            zoom: bounds.zoom_to_fit(max_zoom),
            bounds: Some(bounds),
        });
        state.ops.push(SurfaceOp::FitToMarkers {
            count: positions.len(),
        });
        Ok(())
    }

    fn center_on(&mut self, position: LatLng) -> Result<(), SurfaceError> {
        check_position(position)?;
        let mut state = self.live()?;
        let viewport = state.viewport.get_or_insert(Viewport {
            center: position,
            zoom: WORLD_VIEW_ZOOM,
            bounds: None,
        });
        viewport.center = position;
        state.ops.push(SurfaceOp::CenterOn { position });
        Ok(())
    }

    fn set_zoom(&mut self, level: u8) -> Result<(), SurfaceError> {
        let level = level.min(self.max_zoom);
        let mut state = self.live()?;
        let viewport = state.viewport.get_or_insert(Viewport {
            center: LatLng::new(0.0, 0.0),
            zoom: level,
            bounds: None,
        });
        viewport.zoom = level;
        state.ops.push(SurfaceOp::SetZoom { level });
        Ok(())
    }

    fn has_bounds(&self) -> bool {
        lock(&self.state)
            .viewport
            .is_some_and(|viewport| viewport.bounds.is_some())
    }

    fn destroy(&mut self) -> Result<(), SurfaceError> {
        let mut state = self.live()?;
        state.markers.clear();
        state.callbacks.clear();
        state.viewport = None;
        state.destroyed = true;
        state.ops.push(SurfaceOp::Destroy);
        debug!("surface: destroyed");
        Ok(())
    }
}

/// Read-only view onto an [`InMemorySurface`].
#[derive(Clone)]
pub struct SurfaceInspector {
    state: Arc<Mutex<SurfaceState>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SurfaceReport {
    pub destroyed: bool,
    pub markers: Vec<(MarkerKey, RenderedMarker)>,
    pub viewport: Option<Viewport>,
    pub op_count: usize,
}

impl SurfaceInspector {
    pub fn markers(&self) -> BTreeMap<MarkerKey, RenderedMarker> {
        lock(&self.state).markers.clone()
    }

    pub fn marker(&self, key: MarkerKey) -> Option<RenderedMarker> {
        lock(&self.state).markers.get(&key).cloned()
    }

    pub fn viewport(&self) -> Option<Viewport> {
        lock(&self.state).viewport
    }

    pub fn ops(&self) -> Vec<SurfaceOp> {
        lock(&self.state).ops.clone()
    }

    pub fn is_destroyed(&self) -> bool {
        lock(&self.state).destroyed
    }

    /// Simulates a user clicking the marker. Returns false when the marker has no handler.
    pub fn click(&self, key: MarkerKey) -> bool {
        let callback = lock(&self.state).callbacks.get(&key).cloned();
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    pub fn report(&self) -> SurfaceReport {
        let state = lock(&self.state);
        SurfaceReport {
            destroyed: state.destroyed,
            markers: state
                .markers
                .iter()
                .map(|(key, marker)| (*key, marker.clone()))
                .collect(),
            viewport: state.viewport,
            op_count: state.ops.len(),
        }
    }
}

/// Host whose render target shows up after a configurable number of probes.
pub struct InMemoryHost {
    target: String,
    appears_after: Option<u32>,
    probes: AtomicU32,
    surfaces: Mutex<Vec<SurfaceInspector>>,
}

impl InMemoryHost {
    pub fn new(target: impl Into<String>) -> Self {
        Self::with_target_after(target, 0)
    }

    /// The target is missing for the first `probes` lookups.
    pub fn with_target_after(target: impl Into<String>, probes: u32) -> Self {
        Self {
            target: target.into(),
            appears_after: Some(probes),
            probes: AtomicU32::new(0),
            surfaces: Mutex::new(Vec::new()),
        }
    }

    /// The target never appears.
    pub fn without_target(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            appears_after: None,
            probes: AtomicU32::new(0),
            surfaces: Mutex::new(Vec::new()),
        }
    }

    pub fn probe_count(&self) -> u32 {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn surfaces_created(&self) -> usize {
        self.surfaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Inspector for the most recently created surface.
    pub fn latest_surface(&self) -> Option<SurfaceInspector> {
        self.surfaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

#[async_trait]
impl RenderHost for InMemoryHost {
    async fn has_target(&self, target: &str) -> bool {
        let seen = self.probes.fetch_add(1, Ordering::SeqCst);
        if target != self.target {
            return false;
        }
        self.appears_after.is_some_and(|after| seen >= after)
    }

    fn create_surface(&self, options: &SurfaceOptions) -> Result<Box<dyn MapSurface>, SurfaceError> {
        if options.target != self.target {
            return Err(SurfaceError::Backend(format!(
                "render target '{}' not found",
                options.target
            )));
        }
        let surface = InMemorySurface::new(options);
        self.surfaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(surface.inspector());
        Ok(Box::new(surface))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use super::*;

    fn surface() -> (InMemorySurface, SurfaceInspector) {
        let surface = InMemorySurface::new(&SurfaceOptions::default());
        let inspector = surface.inspector();
        (surface, inspector)
    }

    #[test]
    fn starts_at_initial_view_without_bounds() {
        let (surface, inspector) = surface();
        let viewport = inspector.viewport().expect("viewport");
        assert_eq!(viewport.zoom, 3);
        assert_eq!(viewport.center, LatLng::new(50.0, 50.0));
        assert!(!surface.has_bounds());
    }

    #[test]
    fn fit_frames_all_positions() {
        let (mut surface, inspector) = surface();
        surface
            .fit_to_markers(&[LatLng::new(0.0, 0.0), LatLng::new(10.0, 20.0)])
            .expect("fit");

        let viewport = inspector.viewport().expect("viewport");
        assert_eq!(viewport.center, LatLng::new(5.0, 10.0));
        assert!(viewport.zoom >= WORLD_VIEW_ZOOM && viewport.zoom <= 10);
        assert!(surface.has_bounds());
    }

    #[test]
    fn fitting_a_single_point_uses_max_zoom() {
        let (mut surface, inspector) = surface();
        surface
            .fit_to_markers(&[LatLng::new(1.0, 1.0)])
            .expect("fit");
        assert_eq!(inspector.viewport().expect("viewport").zoom, 10);
    }

    #[test]
    fn unknown_and_destroyed_operations_fail() {
        let (mut surface, inspector) = surface();
        let key = surface.add_marker(LatLng::new(1.0, 1.0)).expect("add");
        surface.remove_marker(key).expect("remove");
        assert!(matches!(
            surface.remove_marker(key),
            Err(SurfaceError::UnknownMarker(missing)) if missing == key
        ));

        surface.destroy().expect("destroy");
        assert!(inspector.is_destroyed());
        assert!(matches!(
            surface.add_marker(LatLng::new(1.0, 1.0)),
            Err(SurfaceError::Destroyed)
        ));
    }

    #[test]
    fn rejects_non_finite_coordinates() {
        let (mut surface, _) = surface();
        assert!(matches!(
            surface.add_marker(LatLng::new(f64::NAN, 1.0)),
            Err(SurfaceError::InvalidCoordinates { .. })
        ));
    }

    #[test]
    fn click_invokes_registered_callback() {
        let (mut surface, inspector) = surface();
        let key = surface.add_marker(LatLng::new(1.0, 1.0)).expect("add");
        assert!(!inspector.click(key));

        let clicked = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&clicked);
        surface
            .on_click(key, Arc::new(move || flag.store(true, Ordering::SeqCst)))
            .expect("on_click");

        assert!(inspector.click(key));
        assert!(clicked.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn host_target_appears_after_configured_probes() {
        let host = InMemoryHost::with_target_after("map", 2);
        assert!(!host.has_target("map").await);
        assert!(!host.has_target("map").await);
        assert!(host.has_target("map").await);
        assert!(!host.has_target("elsewhere").await);
        assert_eq!(host.probe_count(), 4);
    }

    #[tokio::test]
    async fn host_without_target_never_binds() {
        let host = InMemoryHost::without_target("map");
        for _ in 0..5 {
            assert!(!host.has_target("map").await);
        }
        assert!(host.latest_surface().is_none());
    }

    #[test]
    fn report_serializes_rendered_state() {
        let host = InMemoryHost::new("map");
        let mut surface = host
            .create_surface(&SurfaceOptions::default())
            .expect("surface");
        surface.add_marker(LatLng::new(1.0, 2.0)).expect("add");

        let report = host.latest_surface().expect("inspector").report();
        let json = serde_json::to_value(&report).expect("json");
        assert_eq!(json["markers"].as_array().map(Vec::len), Some(1));
        assert_eq!(json["destroyed"], false);
    }
}
