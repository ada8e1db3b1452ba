use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed map model: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("marker {id} has non-finite coordinates ({lat}, {lng})")]
    NonFiniteCoordinates { id: i64, lat: f64, lng: f64 },
}
