use super::*;
use std::{collections::BTreeSet, sync::Arc, time::Duration};

use map_surface::InMemoryHost;
use shared::domain::{EventId, Marker};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::retry::RetryPolicy;

fn visible(id: i64) -> Snapshot {
    Snapshot::visible(vec![Marker::new(EventId(id), 1.0, 1.0)], None)
}

fn service(
    host: &Arc<InMemoryHost>,
    policy: SupersedePolicy,
) -> (MapSyncService, mpsc::UnboundedReceiver<SelectEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let reconciler = MapReconciler::new(host.clone(), tx)
        .with_retry(RetryPolicy::new(20, Duration::from_millis(50)));
    (MapSyncService::new(reconciler, policy), rx)
}

/// Sends `first`, waits `gap`, then sends `second` and closes the stream.
fn two_snapshots(first: Snapshot, gap: Duration, second: Snapshot) -> ReceiverStream<Snapshot> {
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        tx.send(first).await.expect("send first");
        tokio::time::sleep(gap).await;
        tx.send(second).await.expect("send second");
    });
    ReceiverStream::new(rx)
}

#[test]
fn parses_supersede_policy() {
    assert_eq!("cancel".parse::<SupersedePolicy>().expect("cancel"), SupersedePolicy::Cancel);
    assert_eq!(" Finish ".parse::<SupersedePolicy>().expect("finish"), SupersedePolicy::Finish);
    assert!(matches!(
        "later".parse::<SupersedePolicy>(),
        Err(SyncError::UnknownSupersedePolicy(raw)) if raw == "later"
    ));
}

#[tokio::test(start_paused = true)]
async fn primes_producer_with_empty_selection() {
    let host = Arc::new(InMemoryHost::new("map"));
    let (mut service, mut rx) = service(&host, SupersedePolicy::Cancel);

    let summary = service
        .run(futures::stream::iter(Vec::<Snapshot>::new()))
        .await
        .expect("run");

    assert_eq!(summary, SyncSummary::default());
    assert_eq!(rx.try_recv().expect("priming selection"), SelectEvent(None));
}

#[tokio::test(start_paused = true)]
async fn finish_policy_reconciles_every_snapshot_in_order() {
    let host = Arc::new(InMemoryHost::new("map"));
    let (mut service, _rx) = service(&host, SupersedePolicy::Finish);

    let summary = service
        .run(futures::stream::iter(vec![visible(1), visible(2), Snapshot::hidden()]))
        .await
        .expect("run");

    assert_eq!(summary.snapshots, 3);
    assert_eq!(summary.reconciled, 2);
    assert_eq!(summary.hidden, 1);
    assert!(!service.reconciler().is_bound());
}

#[tokio::test(start_paused = true)]
async fn cancel_policy_collapses_a_burst_to_the_latest_snapshot() {
    let host = Arc::new(InMemoryHost::new("map"));
    let (mut service, _rx) = service(&host, SupersedePolicy::Cancel);

    let summary = service
        .run(futures::stream::iter(vec![visible(1), visible(2), visible(3)]))
        .await
        .expect("run");

    assert_eq!(summary.snapshots, 3);
    assert_eq!(summary.superseded, 2);
    assert_eq!(summary.reconciled, 1);
    assert_eq!(host.probe_count(), 1);
    assert_eq!(
        service.reconciler().attached_ids(),
        [EventId(3)].into_iter().collect::<BTreeSet<_>>()
    );
}

#[tokio::test(start_paused = true)]
async fn newer_snapshot_cancels_a_waiting_pass() {
    let host = Arc::new(InMemoryHost::without_target("map"));
    let (mut service, _rx) = service(&host, SupersedePolicy::Cancel);

    let stream = two_snapshots(visible(1), Duration::from_millis(120), Snapshot::hidden());
    let summary = service.run(stream).await.expect("run");

    assert_eq!(summary.snapshots, 2);
    assert_eq!(summary.superseded, 1);
    assert_eq!(summary.gave_up, 0);
    assert_eq!(summary.hidden, 1);
    assert_eq!(host.probe_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn finish_policy_lets_the_waiting_pass_give_up_first() {
    let host = Arc::new(InMemoryHost::without_target("map"));
    let (mut service, _rx) = service(&host, SupersedePolicy::Finish);

    let stream = two_snapshots(visible(1), Duration::from_millis(120), Snapshot::hidden());
    let summary = service.run(stream).await.expect("run");

    assert_eq!(summary.snapshots, 2);
    assert_eq!(summary.superseded, 0);
    assert_eq!(summary.gave_up, 1);
    assert_eq!(summary.hidden, 1);
    assert_eq!(host.probe_count(), 20);
}

#[tokio::test(start_paused = true)]
async fn stream_end_lets_the_last_pass_complete() {
    let host = Arc::new(InMemoryHost::with_target_after("map", 3));
    let (mut service, _rx) = service(&host, SupersedePolicy::Cancel);

    let summary = service
        .run(futures::stream::iter(vec![visible(1)]))
        .await
        .expect("run");

    assert_eq!(summary.reconciled, 1);
    assert_eq!(summary.superseded, 0);
    assert_eq!(
        service.into_reconciler().attached_ids(),
        [EventId(1)].into_iter().collect::<BTreeSet<_>>()
    );
}

#[tokio::test(start_paused = true)]
async fn surface_errors_stop_the_service() {
    let host = Arc::new(InMemoryHost::new("map"));
    let (mut service, _rx) = service(&host, SupersedePolicy::Finish);
    let broken = Snapshot::visible(vec![Marker::new(EventId(1), f64::INFINITY, 0.0)], None);

    let err = service
        .run(futures::stream::iter(vec![broken, visible(2)]))
        .await
        .expect_err("surface error");

    assert!(matches!(err, SyncError::Surface(_)));
}
