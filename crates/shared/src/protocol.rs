//! Wire shapes exchanged with the front-end ports.

use serde::{Deserialize, Serialize};

use crate::{
    domain::{EventId, Marker},
    error::WireError,
    snapshot::Snapshot,
};

/// Model published on the front-end's map port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapModel {
    #[serde(default)]
    pub events: Vec<EventId>,
    pub leaflet: LeafletModel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafletModel {
    pub show_map: bool,
    #[serde(default)]
    pub markers: Vec<MarkerPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_marker: Option<EventId>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarkerPayload {
    pub id: EventId,
    pub lat: f64,
    pub lng: f64,
}

impl MapModel {
    pub fn from_json(raw: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn into_snapshot(self) -> Result<Snapshot, WireError> {
        let markers = self
            .leaflet
            .markers
            .into_iter()
            .map(|payload| {
                if !payload.lat.is_finite() || !payload.lng.is_finite() {
                    return Err(WireError::NonFiniteCoordinates {
                        id: payload.id.0,
                        lat: payload.lat,
                        lng: payload.lng,
                    });
                }
                Ok(Marker::new(payload.id, payload.lat, payload.lng))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Snapshot::new(
            self.leaflet.show_map,
            markers,
            self.leaflet.selected_marker,
            self.events,
        ))
    }
}

/// Value sent back on the front-end's `selectEvent` port.
///
/// `None` clears the selection; the driver also sends it once at start-up so
/// the producer announces its initial model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectEvent(pub Option<EventId>);
