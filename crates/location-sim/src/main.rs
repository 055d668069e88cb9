// ============================
// location-sim/src/main.rs
// ============================
//! Runs one sharing user and one viewer against an in-memory backend.
//!
//! The sharer registers the background task, the simulated GPS walks a short
//! route, and the viewer's live feed is printed before and after sharing stops.
mod sim;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use headpat_common::PermissionStatus;
use location_core::config::Settings;
use location_core::profiles::StoreProfiles;
use location_core::store::{DocumentStore, MemoryDocumentStore};
use location_core::{LiveLocationFeed, LocationServices, LocationUpdateHandler, SharingController};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::sim::{PromptAnswers, SimulatedDevice, StaticSession};

/// A short walk around Alexanderplatz
const ROUTE: [(f64, f64); 4] = [
    (52.5219, 13.4132),
    (52.5223, 13.4140),
    (52.5227, 13.4151),
    (52.5221, 13.4160),
];

#[derive(Parser, Debug)]
#[command(name = "headpat-location-sim", about = "Simulate location sharing end to end")]
struct Args {
    /// TOML settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// User who shares their location
    #[arg(long, default_value = "alice")]
    user: String,

    /// User watching the live map
    #[arg(long, default_value = "bob")]
    viewer: String,

    /// Fixes delivered before sharing is stopped
    #[arg(long, default_value_t = 4)]
    fixes: usize,

    /// Milliseconds between simulated fixes
    #[arg(long, default_value_t = 500)]
    interval_ms: u64,

    #[arg(long)]
    deny_foreground: bool,

    #[arg(long)]
    deny_background: bool,
}

fn answer(deny: bool) -> PermissionStatus {
    if deny {
        PermissionStatus::Denied
    } else {
        PermissionStatus::Granted
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .context("loading settings")?;
    settings.tracking.time_interval = args.interval_ms;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let memory = MemoryDocumentStore::new(&settings.database_id);
    for (user_id, name) in [(&args.user, "Alice"), (&args.viewer, "Bob")] {
        memory
            .create(
                &settings.profiles_collection,
                user_id,
                json!({ "displayName": name, "username": user_id }),
            )
            .await?;
    }
    let store: Arc<dyn DocumentStore> = Arc::new(memory.clone());

    let device = Arc::new(SimulatedDevice::new(
        PromptAnswers {
            foreground: answer(args.deny_foreground),
            background: answer(args.deny_background),
        },
        ROUTE.to_vec(),
        args.fixes,
    ));

    let services = LocationServices::new(
        settings.clone(),
        store.clone(),
        device.clone(),
        device.clone(),
        Arc::new(StaticSession::new(&args.user)),
    );
    let handler = Arc::new(LocationUpdateHandler::new(services.clone()));
    device.define_task(&settings.task_name, handler);
    let controller = SharingController::new(services);

    let profiles = Arc::new(StoreProfiles::new(store.clone(), &settings.profiles_collection));
    let viewer = Arc::new(LiveLocationFeed::new(
        &settings,
        store,
        Arc::new(memory),
        profiles,
        Some(args.viewer.clone()),
    ));
    viewer.focus().await?;

    let status = controller.check_status().await;
    info!(?status, "initial sharing status");

    if let Err(e) = controller.register_background_fetch().await {
        warn!(code = e.error_code(), "could not start sharing: {}", e.user_message());
        viewer.blur();
        return Ok(());
    }

    let interval = Duration::from_millis(settings.tracking.time_interval.max(1));
    tokio::time::sleep(interval * (args.fixes as u32 + 1)).await;
    println!("while sharing:\n{}", serde_json::to_string_pretty(&viewer.snapshot())?);

    controller.unregister_background_fetch().await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    println!("after stopping:\n{}", serde_json::to_string_pretty(&viewer.snapshot())?);

    viewer.blur();
    Ok(())
}
