//! Light Bulb Simulator HTTP Server
//!
//! Runs one simulated bulb and exposes it over HTTP so a browser page (or
//! curl) can switch it, dim it, and watch its state change.
//!
//! ## Architecture
//! - **Controller thread** (std::thread): owns the bulb, fires the timers,
//!   writes the state file
//! - **HTTP server** (tokio/axum): accepts API requests, sends commands via channel
//!
//! ## Usage
//! ```sh
//! ./target/release/lightbulb-sim --state-file bulb-state.json --port 8080
//! curl -X POST http://localhost:8080/api/v1/power/toggle
//! ```

use clap::Parser;
use lightbulb_sim::bulb::BulbController;
use lightbulb_sim::persistence::{self, JsonFileStore, MemoryStore, SnapshotStore};
use lightbulb_sim::runtime::{BulbCommand, CommandRequest, spawn_controller};
use lightbulb_sim::server::{self, AppState};
use lightbulb_sim::{BulbConfig, ResetPolicy};
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Light Bulb Simulator HTTP Server
#[derive(Parser)]
#[command(name = "lightbulb-sim")]
#[command(about = "HTTP API server for a simulated dimmable light bulb")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "8080")]
    port: u16,

    /// File the bulb state is saved to between runs
    #[arg(long, default_value = "bulb-state.json")]
    state_file: PathBuf,

    /// Keep state in memory only; nothing is read or written on disk
    #[arg(long)]
    ephemeral: bool,

    /// Milliseconds between auto-cycle brightness steps
    #[arg(long, default_value = "1000")]
    auto_cycle_interval_ms: u64,

    /// Reset also zeroes the energy counter
    #[arg(long)]
    reset_clears_energy: bool,

    /// Reset also zeroes the runtime counter
    #[arg(long)]
    reset_clears_runtime: bool,
}

impl Args {
    fn bulb_config(&self) -> BulbConfig {
        BulbConfig::new(
            Duration::from_millis(self.auto_cycle_interval_ms),
            ResetPolicy {
                clear_energy: self.reset_clears_energy,
                clear_runtime: self.reset_clears_runtime,
            },
        )
    }

    fn store(&self) -> Box<dyn SnapshotStore> {
        if self.ephemeral {
            Box::new(MemoryStore::new())
        } else {
            Box::new(JsonFileStore::new(&self.state_file))
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber; RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_ansi(false) // Disable ANSI color codes for systemd/journald
        .compact()
        .init();

    let args = Args::parse();
    let config = args.bulb_config();

    tracing::info!("Light Bulb Simulator v{}", env!("CARGO_PKG_VERSION"));
    if args.ephemeral {
        tracing::info!("State: in memory only");
    } else {
        tracing::info!("State file: {}", args.state_file.display());
    }
    tracing::info!("Auto-cycle interval: {:?}", config.auto_cycle_interval);
    tracing::info!("Reset policy: {:?}", config.reset);

    let store = args.store();
    let bulb = match persistence::load_or_default(store.as_ref()) {
        Some(record) => {
            tracing::info!(
                "Restored bulb: on={} brightness={} energy={}Wh",
                record.is_on,
                record.brightness,
                record.total_energy_watt_hours
            );
            BulbController::restore(record, config.reset)
        }
        None => BulbController::new(config.reset),
    };

    let controller = spawn_controller(bulb, store, config)?;

    let app_state = AppState {
        commands: controller.commands.clone(),
        snapshots: controller.snapshots.clone(),
    };
    let app = server::create_router(app_state);

    let addr = format!("{}:{}", args.bind, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("API Documentation: http://localhost:{}/docs", args.port);
    tracing::info!("Try: curl http://localhost:{}/api/v1/status", args.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(controller.commands.clone()))
        .await?;

    // Already asked to stop; this waits for the final save
    controller.shutdown();
    tracing::info!("Shut down cleanly.");

    Ok(())
}

/// Resolve on Ctrl+C after telling the controller to stop.
///
/// Stopping the controller closes the snapshot channel, which ends any open
/// WebSocket streams so graceful shutdown does not wait on them forever.
async fn shutdown_signal(commands: Sender<CommandRequest>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Could not listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
    let _ = commands.send(CommandRequest::without_reply(BulbCommand::Shutdown));
}
