//! Reading recorded port models and turning them into a snapshot stream.

use std::{fs, path::Path, pin::Pin, time::Duration};

use anyhow::{Context, Result};
use futures::{stream, Stream, StreamExt};
use shared::{protocol::MapModel, Snapshot};

pub type SnapshotStream = Pin<Box<dyn Stream<Item = Snapshot> + Send>>;

/// Parses one port model per non-empty line; lines starting with `#` are comments.
pub fn parse_snapshots(raw: &str) -> Result<Vec<Snapshot>> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            MapModel::from_json(line)
                .and_then(MapModel::into_snapshot)
                .with_context(|| format!("invalid map model on line {}", index + 1))
        })
        .collect()
}

pub fn load_snapshots(path: &Path) -> Result<Vec<Snapshot>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshots from '{}'", path.display()))?;
    parse_snapshots(&raw)
}

/// Emits `snapshots` with `pace` between them, like a producer reacting to user input.
pub fn paced(snapshots: Vec<Snapshot>, pace: Duration) -> SnapshotStream {
    if pace.is_zero() {
        return Box::pin(stream::iter(snapshots));
    }
    Box::pin(stream::iter(snapshots).then(move |snapshot| async move {
        tokio::time::sleep(pace).await;
        snapshot
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::domain::EventId;

    #[test]
    fn skips_blank_and_comment_lines() {
        let raw = r#"
# initial load
{"events": [1], "leaflet": {"showMap": true, "markers": [{"id": 1, "lat": 1.0, "lng": 2.0}]}}

{"events": [], "leaflet": {"showMap": false}}
"#;
        let snapshots = parse_snapshots(raw).expect("parse");
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].markers()[0].id, EventId(1));
        assert!(!snapshots[1].show_map());
    }

    #[test]
    fn reports_offending_line() {
        let raw = "{\"events\": [], \"leaflet\": {\"showMap\": true}}\n{not json}\n";
        let err = parse_snapshots(raw).expect_err("must fail");
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[tokio::test(start_paused = true)]
    async fn paced_stream_spaces_snapshots() {
        let started = tokio::time::Instant::now();
        let snapshots = paced(
            vec![Snapshot::hidden(), Snapshot::hidden()],
            Duration::from_millis(30),
        );

        let collected: Vec<Snapshot> = snapshots.collect().await;

        assert_eq!(collected.len(), 2);
        assert!(started.elapsed() >= Duration::from_millis(60));
    }
}
