use std::collections::BTreeSet;

use crate::domain::{EventId, Marker};

/// Immutable description of what the map should currently display.
///
/// `event_ids` holds every known event, including the ones filtered out of
/// `markers` upstream. An id present in `event_ids` but not in `markers` is
/// hidden; an id missing from `event_ids` has been deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    show_map: bool,
    markers: Vec<Marker>,
    selected_marker: Option<EventId>,
    event_ids: BTreeSet<EventId>,
}

impl Snapshot {
    pub fn new(
        show_map: bool,
        markers: Vec<Marker>,
        selected_marker: Option<EventId>,
        event_ids: impl IntoIterator<Item = EventId>,
    ) -> Self {
        Self {
            show_map,
            markers,
            selected_marker,
            event_ids: event_ids.into_iter().collect(),
        }
    }

    pub fn hidden() -> Self {
        Self::new(false, Vec::new(), None, [])
    }

    /// Visible snapshot where every marker is also a known event.
    pub fn visible(markers: Vec<Marker>, selected_marker: Option<EventId>) -> Self {
        let event_ids: Vec<EventId> = markers.iter().map(|marker| marker.id).collect();
        Self::new(true, markers, selected_marker, event_ids)
    }

    pub fn show_map(&self) -> bool {
        self.show_map
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn selected_marker(&self) -> Option<EventId> {
        self.selected_marker
    }

    pub fn event_ids(&self) -> &BTreeSet<EventId> {
        &self.event_ids
    }

    /// The selected marker, if the selection refers to a marker in this snapshot.
    pub fn selected(&self) -> Option<&Marker> {
        let selected = self.selected_marker?;
        self.markers.iter().find(|marker| marker.id == selected)
    }
}
