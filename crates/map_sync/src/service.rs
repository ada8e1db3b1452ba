//! Drives the reconciler from the front-end's snapshot stream.

use std::str::FromStr;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use shared::{protocol::SelectEvent, Snapshot};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    error::SyncError,
    reconciler::{MapReconciler, ReconcileOutcome},
};

/// What happens to a pass still waiting for its render target when a newer
/// snapshot arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupersedePolicy {
    /// Cancel the waiting pass and reconcile the newer snapshot.
    #[default]
    Cancel,
    /// Let the waiting pass finish its retry cycle, then take the newer snapshot.
    Finish,
}

impl FromStr for SupersedePolicy {
    type Err = SyncError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cancel" => Ok(Self::Cancel),
            "finish" => Ok(Self::Finish),
            other => Err(SyncError::UnknownSupersedePolicy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub snapshots: usize,
    pub reconciled: usize,
    pub hidden: usize,
    pub gave_up: usize,
    pub superseded: usize,
}

impl SyncSummary {
    fn record(&mut self, outcome: &ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Hidden => self.hidden += 1,
            ReconcileOutcome::Reconciled(_) => self.reconciled += 1,
            ReconcileOutcome::GaveUp { .. } => self.gave_up += 1,
            ReconcileOutcome::Cancelled { .. } => self.superseded += 1,
        }
    }
}

pub struct MapSyncService {
    reconciler: MapReconciler,
    policy: SupersedePolicy,
}

impl MapSyncService {
    pub fn new(reconciler: MapReconciler, policy: SupersedePolicy) -> Self {
        Self { reconciler, policy }
    }

    pub fn reconciler(&self) -> &MapReconciler {
        &self.reconciler
    }

    pub fn into_reconciler(self) -> MapReconciler {
        self.reconciler
    }

    /// Consumes `snapshots` until the stream ends.
    ///
    /// Publishes an empty selection first: the producer only announces its
    /// model after a change, so this makes it emit the initial snapshot.
    pub async fn run<S>(&mut self, snapshots: S) -> Result<SyncSummary, SyncError>
    where
        S: Stream<Item = Snapshot> + Unpin,
    {
        let mut snapshots = snapshots;
        let mut summary = SyncSummary::default();
        let mut pending: Option<Snapshot> = None;
        let mut exhausted = false;

        self.reconciler.publish_selection(SelectEvent(None));
        info!(policy = ?self.policy, "map: sync service started");

        loop {
            let snapshot = match pending.take() {
                Some(snapshot) => snapshot,
                None if exhausted => break,
                None => match snapshots.next().await {
                    Some(snapshot) => snapshot,
                    None => break,
                },
            };
            summary.snapshots += 1;

            let outcome = match self.policy {
                SupersedePolicy::Finish => {
                    self.reconciler
                        .on_snapshot(&snapshot, &CancellationToken::new())
                        .await?
                }
                SupersedePolicy::Cancel if exhausted => {
                    self.reconciler
                        .on_snapshot(&snapshot, &CancellationToken::new())
                        .await?
                }
                SupersedePolicy::Cancel => {
                    let cancel = CancellationToken::new();
                    let pass = self.reconciler.on_snapshot(&snapshot, &cancel);
                    tokio::pin!(pass);

                    tokio::select! {
                        biased;
                        outcome = &mut pass => outcome?,
                        next = snapshots.next() => {
                            match next {
                                Some(newer) => {
                                    cancel.cancel();
                                    pending = Some(newer);
                                }
                                None => exhausted = true,
                            }
                            pass.await?
                        }
                    }
                }
            };

            summary.record(&outcome);
        }

        info!(
            snapshots = summary.snapshots,
            reconciled = summary.reconciled,
            hidden = summary.hidden,
            gave_up = summary.gave_up,
            superseded = summary.superseded,
            "map: snapshot stream ended"
        );
        Ok(summary)
    }
}

#[cfg(test)]
#[path = "tests/service_tests.rs"]
mod tests;
