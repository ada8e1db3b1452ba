use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use map_surface::{
    ClickCallback, Icon, MapSurface, MarkerKey, RenderHost, SurfaceOptions, WORLD_VIEW_ZOOM,
};
use shared::{
    domain::{EventId, LatLng},
    protocol::SelectEvent,
    Snapshot,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::SyncError,
    retry::{wait_for_target, BindOutcome, RetryPolicy},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewportAction {
    FitToMarkers { count: usize },
    CenterOnSelected { id: EventId, fitted_first: bool },
    WorldView,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: usize,
    pub updated: usize,
    pub detached_filtered: usize,
    pub detached_deleted: usize,
    pub viewport: ViewportAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Hidden,
    Reconciled(ReconcileReport),
    GaveUp { attempts: u32 },
    Cancelled { attempts: u32 },
}

/// Owns the map surface and the id -> marker handle table.
///
/// A `None` entry in the handle table is a tombstone: the id was rendered
/// once and has since been detached from the surface.
pub struct MapReconciler {
    host: Arc<dyn RenderHost>,
    options: SurfaceOptions,
    retry: RetryPolicy,
    selections: mpsc::UnboundedSender<SelectEvent>,
    surface: Option<Box<dyn MapSurface>>,
    handles: HashMap<EventId, Option<MarkerKey>>,
}

impl MapReconciler {
    pub fn new(host: Arc<dyn RenderHost>, selections: mpsc::UnboundedSender<SelectEvent>) -> Self {
        Self {
            host,
            options: SurfaceOptions::default(),
            retry: RetryPolicy::default(),
            selections,
            surface: None,
            handles: HashMap::new(),
        }
    }

    pub fn with_options(mut self, options: SurfaceOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn options(&self) -> &SurfaceOptions {
        &self.options
    }

    pub fn is_bound(&self) -> bool {
        self.surface.is_some()
    }

    /// Entries in the handle table, tombstones included.
    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    pub fn handle(&self, id: EventId) -> Option<MarkerKey> {
        self.handles.get(&id).copied().flatten()
    }

    pub fn attached_ids(&self) -> BTreeSet<EventId> {
        self.handles
            .iter()
            .filter(|(_, key)| key.is_some())
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn publish_selection(&self, selection: SelectEvent) {
        if self.selections.send(selection).is_err() {
            debug!("map: selection receiver closed; dropping {:?}", selection.0);
        }
    }

    pub async fn on_snapshot(
        &mut self,
        snapshot: &Snapshot,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome, SyncError> {
        if !snapshot.show_map() {
            self.hide()?;
            return Ok(ReconcileOutcome::Hidden);
        }

        match wait_for_target(self.host.as_ref(), &self.options.target, self.retry, cancel).await {
            BindOutcome::Ready { attempts } => {
                debug!(render_target = %self.options.target, attempts, "map: render target ready");
            }
            BindOutcome::GaveUp { attempts } => {
                warn!(
                    render_target = %self.options.target,
                    attempts,
                    "map: render target never appeared; skipping snapshot"
                );
                return Ok(ReconcileOutcome::GaveUp { attempts });
            }
            BindOutcome::Cancelled { attempts } => {
                debug!(attempts, "map: bind wait cancelled by a newer snapshot");
                return Ok(ReconcileOutcome::Cancelled { attempts });
            }
        }

        self.apply(snapshot).map(ReconcileOutcome::Reconciled)
    }

    /// Destroys the surface, if any, and forgets every handle.
    pub fn hide(&mut self) -> Result<(), SyncError> {
        self.handles.clear();
        if let Some(mut surface) = self.surface.take() {
            surface.destroy()?;
            info!("map: hidden; surface destroyed");
        }
        Ok(())
    }

    /// Reconciles against the render target, which must already exist.
    pub fn apply(&mut self, snapshot: &Snapshot) -> Result<ReconcileReport, SyncError> {
        let surface = match self.surface.take() {
            Some(surface) => surface,
            None => {
                let surface = self.host.create_surface(&self.options)?;
                info!(render_target = %self.options.target, "map: surface created");
                surface
            }
        };
        let surface = &mut **self.surface.insert(surface);

        let (created, updated) =
            place_markers(surface, &mut self.handles, &self.selections, snapshot)?;
        let (detached_filtered, detached_deleted) =
            detach_stale(surface, &mut self.handles, snapshot)?;
        let viewport = frame_viewport(surface, snapshot)?;

        let report = ReconcileReport {
            created,
            updated,
            detached_filtered,
            detached_deleted,
            viewport,
        };
        info!(
            markers = snapshot.markers().len(),
            created,
            updated,
            detached_filtered,
            detached_deleted,
            viewport = ?viewport,
            "map: snapshot reconciled"
        );
        Ok(report)
    }
}

fn click_callback(selections: &mpsc::UnboundedSender<SelectEvent>, id: EventId) -> ClickCallback {
    let selections = selections.clone();
    Arc::new(move || {
        if selections.send(SelectEvent(Some(id))).is_err() {
            debug!(event_id = id.0, "map: marker clicked after selection receiver closed");
        }
    })
}

fn place_markers(
    surface: &mut dyn MapSurface,
    handles: &mut HashMap<EventId, Option<MarkerKey>>,
    selections: &mpsc::UnboundedSender<SelectEvent>,
    snapshot: &Snapshot,
) -> Result<(usize, usize), SyncError> {
    let mut created = 0;
    let mut updated = 0;

    for marker in snapshot.markers() {
        let position = marker.position();
        let key = match handles.get(&marker.id).copied().flatten() {
            Some(key) => {
                surface.set_position(key, position)?;
                updated += 1;
                key
            }
            None => {
                let key = surface.add_marker(position)?;
                surface.on_click(key, click_callback(selections, marker.id))?;
                handles.insert(marker.id, Some(key));
                debug!(event_id = marker.id.0, key = key.0, "map: marker attached");
                created += 1;
                key
            }
        };

        let selected = snapshot.selected_marker() == Some(marker.id);
        surface.set_icon(key, Icon::for_selection(selected))?;
    }

    Ok((created, updated))
}

/// Detaches handles whose ids are filtered out (still known, no marker) or
/// deleted upstream (no longer known at all).
fn detach_stale(
    surface: &mut dyn MapSurface,
    handles: &mut HashMap<EventId, Option<MarkerKey>>,
    snapshot: &Snapshot,
) -> Result<(usize, usize), SyncError> {
    let rendered: BTreeSet<EventId> = snapshot.markers().iter().map(|marker| marker.id).collect();

    let mut filtered = 0;
    let remaining = snapshot.event_ids().difference(&rendered);
    for id in remaining {
        if let Some(slot) = handles.get_mut(id) {
            if let Some(key) = slot.take() {
                surface.remove_marker(key)?;
                debug!(event_id = id.0, "map: filtered marker detached");
                filtered += 1;
            }
        }
    }

    let mut deleted = 0;
    for (id, slot) in handles.iter_mut() {
        if rendered.contains(id) || snapshot.event_ids().contains(id) {
            continue;
        }
        if let Some(key) = slot.take() {
            surface.remove_marker(key)?;
            debug!(event_id = id.0, "map: deleted marker detached");
            deleted += 1;
        }
    }

    Ok((filtered, deleted))
}

fn frame_viewport(
    surface: &mut dyn MapSurface,
    snapshot: &Snapshot,
) -> Result<ViewportAction, SyncError> {
    let positions: Vec<LatLng> = snapshot.markers().iter().map(|marker| marker.position()).collect();
    if positions.is_empty() {
        surface.set_zoom(WORLD_VIEW_ZOOM)?;
        return Ok(ViewportAction::WorldView);
    }

    match snapshot.selected() {
        Some(selected) => {
            let fitted_first = !surface.has_bounds();
            if fitted_first {
                surface.fit_to_markers(&positions)?;
            }
            surface.center_on(selected.position())?;
            Ok(ViewportAction::CenterOnSelected {
                id: selected.id,
                fitted_first,
            })
        }
        None => {
            surface.fit_to_markers(&positions)?;
            Ok(ViewportAction::FitToMarkers {
                count: positions.len(),
            })
        }
    }
}

#[cfg(test)]
#[path = "tests/reconciler_tests.rs"]
mod tests;
