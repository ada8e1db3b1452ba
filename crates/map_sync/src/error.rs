use map_surface::SurfaceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("map surface rejected an update: {0}")]
    Surface(#[from] SurfaceError),
    #[error("unknown supersede policy '{0}' (expected 'cancel' or 'finish')")]
    UnknownSupersedePolicy(String),
}
