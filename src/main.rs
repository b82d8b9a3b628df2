mod client;
mod config;
mod copier;
mod errors;
mod models;
mod session;

use std::time::Duration;

use anyhow::{Context, Result};
use client::GatewayClient;
use config::Config;
use copier::Copier;
use dotenvy::dotenv;
use session::SessionPair;
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt().with_env_filter("info").init();

    let cfg = Config::from_env()?;
    info!(
        "source gateway:      {}:{} (client id {})",
        cfg.source_host, cfg.source_port, cfg.source_client_id
    );
    info!(
        "destination gateway: {}:{} (client id {})",
        cfg.dest_host, cfg.dest_port, cfg.dest_client_id
    );
    info!("poll interval:       {}s", cfg.poll_interval_seconds);

    let source = GatewayClient::new(cfg.source_host.clone(), cfg.source_port, cfg.source_client_id);
    let dest = GatewayClient::new(cfg.dest_host.clone(), cfg.dest_port, cfg.dest_client_id);

    let pair = SessionPair::new(source, dest);
    pair.connect().await.context(
        "startup connect failed; check that the gateway is running on both endpoints, \
         API access is enabled on both accounts, this host is in the destination's \
         trusted IPs, and neither client id is already in use",
    )?;

    // Dedup state is in-memory only, so the first cycle copies every fill
    // the source already reports for today.
    warn!("all of today's existing fills on the source will be copied on the first cycle");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    let copier = Copier::new(pair, Duration::from_secs(cfg.poll_interval_seconds));
    copier.run(shutdown_rx).await;

    info!("sessions closed");
    Ok(())
}
