//! Keeps a map surface's markers in agreement with the snapshots published by the front-end.

pub mod error;
pub mod reconciler;
pub mod retry;
pub mod service;

pub use error::SyncError;
pub use reconciler::{MapReconciler, ReconcileOutcome, ReconcileReport, ViewportAction};
pub use retry::{wait_for_target, BindOutcome, RetryPolicy};
pub use service::{MapSyncService, SupersedePolicy, SyncSummary};
