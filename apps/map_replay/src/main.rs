use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;
use map_surface::{memory::SurfaceReport, InMemoryHost, SurfaceOptions};
use map_sync::{MapReconciler, MapSyncService, SyncSummary};
use serde::Serialize;
use shared::{domain::EventId, protocol::SelectEvent};
use tokio::sync::mpsc;
use tracing::{info, warn};

mod config;
mod replay;

use config::{load_settings, Settings};

/// Replays recorded front-end map models against an in-memory map surface.
#[derive(Parser, Debug)]
struct Cli {
    /// File with one JSON map model per line.
    #[arg(long)]
    snapshots: PathBuf,
    #[arg(long, default_value = "map_sync.toml")]
    config: PathBuf,
    /// Simulate a click on this event's marker after the replay.
    #[arg(long)]
    click: Option<i64>,
}

#[derive(Serialize)]
struct ReplayReport {
    settings: Settings,
    summary: SyncSummary,
    attached: Vec<EventId>,
    surface: Option<SurfaceReport>,
    selections: Vec<SelectEvent>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let cli = Cli::parse();

    let settings = load_settings(&cli.config);
    let snapshots = replay::load_snapshots(&cli.snapshots)?;
    info!(
        count = snapshots.len(),
        path = %cli.snapshots.display(),
        "replay: loaded snapshots"
    );

    let host = Arc::new(InMemoryHost::with_target_after(
        settings.render_target.clone(),
        settings.target_appears_after,
    ));
    let (selections_tx, mut selections_rx) = mpsc::unbounded_channel();
    let reconciler = MapReconciler::new(host.clone(), selections_tx)
        .with_options(SurfaceOptions {
            target: settings.render_target.clone(),
            ..SurfaceOptions::default()
        })
        .with_retry(settings.retry_policy());

    let mut service = MapSyncService::new(reconciler, settings.supersede);
    let stream = replay::paced(snapshots, Duration::from_millis(settings.pace_ms));
    let summary = service.run(stream).await?;
    let reconciler = service.into_reconciler();

    if let Some(id) = cli.click.map(EventId) {
        let clicked = match (host.latest_surface(), reconciler.handle(id)) {
            (Some(surface), Some(key)) => surface.click(key),
            _ => false,
        };
        if !clicked {
            warn!(event_id = id.0, "replay: no attached marker to click");
        }
    }

    let mut selections = Vec::new();
    while let Ok(selection) = selections_rx.try_recv() {
        selections.push(selection);
    }

    let report = ReplayReport {
        settings,
        summary,
        attached: reconciler.attached_ids().into_iter().collect(),
        surface: host.latest_surface().map(|surface| surface.report()),
        selections,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
