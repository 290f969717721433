//! BOLD simulation server binary.
//!
//! Wires the in-memory graph store, the simulation engine and the graph
//! store protocol server together, then waits for agents to start runs by
//! writing the control resource.
//!
//! # Startup Sequence
//!
//! 1. Load configuration (`bold-config.yaml` or the path given as the only
//!    argument) and apply environment overrides
//! 2. Initialize structured logging (tracing)
//! 3. Create the live store and the engine
//! 4. Register datasets and programs, close registration
//! 5. Serve the protocol until `Ctrl-C`
//! 6. Stop any run in progress (it is still replayed) and shut down

mod error;
mod setup;

use std::sync::Arc;

use bold_core::config::BoldConfig;
use bold_core::{EngineSettings, SimulationEngine};
use bold_protocol::{AppState, spawn_protocol_server};
use bold_store::{GraphStore, MemoryStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::ServerBinError;

/// Application entry point for the simulation server.
///
/// # Errors
///
/// Returns an error if any initialization step fails.
#[tokio::main]
async fn main() -> Result<(), ServerBinError> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config);
    info!(
        port = config.server.port,
        base_uri = %config.server.base_uri(),
        timeslot_ms = config.simulation.timeslot_ms,
        output_dir = %config.simulation.output_dir.display(),
        "Configuration loaded"
    );

    // 3. Live store and engine.
    let store = Arc::new(MemoryStore::new());
    let engine = SimulationEngine::new(
        Arc::clone(&store) as Arc<dyn GraphStore>,
        EngineSettings::from_config(&config),
    );

    // 4. Registration.
    setup::configure(&engine, store.as_ref(), &config.simulation).await?;

    // 5. Serve.
    let server =
        spawn_protocol_server(&config.server, Arc::new(AppState::new(engine.clone()))).await?;
    info!(
        addr = %server.local_addr(),
        control = engine.control().iri(),
        "Server started, waiting for PUT on the control resource"
    );

    tokio::signal::ctrl_c()
        .await
        .map_err(ServerBinError::Signal)?;
    info!("Shutdown requested");

    // 6. Finish the current run, if any, then stop serving.
    if let Some(summary) = engine.stop().await {
        info!(
            run = summary.run,
            run_id = %summary.run_id,
            ticks = summary.ticks,
            failures = summary.replay.failures,
            "Last completed run"
        );
    }
    server.shutdown().await;

    info!(
        completed_runs = engine.status().completed_runs,
        "bold-server shutdown complete"
    );
    Ok(())
}

/// Load configuration from the command-line path or the default file,
/// falling back to defaults plus environment overrides.
fn load_config() -> Result<BoldConfig, ServerBinError> {
    match setup::config_path(std::env::args().nth(1)) {
        Some(path) => Ok(BoldConfig::from_file(&path)?),
        None => {
            let mut config = BoldConfig::default();
            config.apply_env_overrides()?;
            Ok(config)
        }
    }
}

/// `RUST_LOG` wins over the configured level; `logging.format: json`
/// switches to JSON lines.
fn init_logging(config: &BoldConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if config.logging.json() {
        builder.json().init();
    } else {
        builder.init();
    }
}
