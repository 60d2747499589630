use anyhow::{Context, Result};
use fleetwatch::api::create_router;
use fleetwatch::clock::SystemClock;
use fleetwatch::config::{load_config, FleetConfig};
use fleetwatch::model::Model;
use fleetwatch::scheduler::TickScheduler;
use std::sync::Arc;
use tracing::info;

/// Preset used when neither a config file nor a preset is given
const DEFAULT_PRESET: &str = "restroom";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleetwatch=info".into()),
        )
        .init();

    info!("Fleetwatch starting...");

    // Config path: FLEETWATCH_CONFIG, then first argument
    let config_path = std::env::var("FLEETWATCH_CONFIG")
        .ok()
        .or_else(|| std::env::args().nth(1));

    let mut config = match &config_path {
        Some(path) => {
            info!(path = %path, "Loading configuration");
            load_config(path).with_context(|| format!("Failed to load config from {}", path))?
        }
        None => FleetConfig::default(),
    };
    config.apply_env();
    if config_path.is_none() && config.simulation.preset.is_none() {
        config.simulation.preset = Some(DEFAULT_PRESET.to_string());
    }

    let config = config
        .resolve_preset()
        .context("Failed to resolve preset")?;
    let model = Arc::new(Model::from_config(&config).context("Invalid configuration")?);

    info!(
        preset = config.simulation.preset.as_deref().unwrap_or("-"),
        tick_period_ms = config.simulation.tick_period_ms,
        seed = ?config.simulation.seed,
        stations = model.stations.len(),
        entities = model.entities.len(),
        "Simulation model built"
    );

    let (scheduler, scheduler_task) = TickScheduler::new(model, Arc::new(SystemClock)).start();

    // Start HTTP API server
    let server_handle = if config.api.enabled {
        let router = create_router(scheduler.clone());
        let listener = tokio::net::TcpListener::bind(&config.api.bind)
            .await
            .with_context(|| format!("Failed to bind API address {}", config.api.bind))?;
        info!(bind = %config.api.bind, "Snapshot API listening");

        Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!(error = %e, "Snapshot API server error");
            }
        }))
    } else {
        info!("Snapshot API disabled");
        None
    };

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    // Graceful shutdown
    if let Some(handle) = server_handle {
        handle.abort();
    }
    scheduler.shutdown();
    scheduler_task
        .await
        .context("Tick scheduler task failed")?;

    info!("Fleetwatch stopped");
    Ok(())
}
