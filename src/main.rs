//! exitlb daemon entry point.

use std::sync::Arc;

use log::{error, info};
use tokio::signal;

mod config;
mod engine;
mod error;
mod gateways;
mod handshake;
mod http_server;
mod net;
mod state;
#[cfg(test)]
mod testing;
mod types;

use config::Config;
use engine::ReconciliationEngine;
use gateways::GatewayService;
use handshake::{Handshake, HandshakeTracker, HttpAnnouncer};
use http_server::{run_http_server, AppState};
use net::{NetworkPort, NetworkStateApplier, ShellNetwork};
use state::{BindingTable, GatewayRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Load configuration
    let cfg = Config::load()?;
    info!("Starting exitlb with config: {:?}", cfg);

    // Shared state
    let bindings = Arc::new(BindingTable::new());
    let registry = Arc::new(GatewayRegistry::new());

    // Host networking
    let port: Arc<dyn NetworkPort> = Arc::new(ShellNetwork::new(&cfg));
    let applier = NetworkStateApplier::new(port.clone(), registry.clone(), &cfg.interface_prefix);
    let engine = Arc::new(ReconciliationEngine::new(bindings, applier));

    // Handshakes towards registering gateways
    let announcer = Arc::new(HttpAnnouncer::from_config(&cfg)?);
    let handshakes = Arc::new(HandshakeTracker::new(Handshake::new(
        port,
        announcer,
        cfg.announce_interval(),
    )));
    let gateways = Arc::new(GatewayService::new(registry, handshakes.clone()));

    // HTTP control API
    let state = AppState { engine, gateways };
    let listen = cfg.listen;
    let http_handle = tokio::spawn(async move {
        if let Err(e) = run_http_server(listen, state).await {
            error!("HTTP server failed: {}", e);
        }
    });

    // Graceful Shutdown
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down...");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
        }
    }

    http_handle.abort();
    info!(
        "Stopping {} outstanding handshake(s)",
        handshakes.active().await
    );
    handshakes.shutdown().await;

    info!("Shutdown complete.");
    Ok(())
}
