//! statustrail - service status dashboard
//!
//! Polls an upstream status source, keeps a rolling history of samples and
//! serves a status page with uptime bars and response time charts.

mod aggregate;
mod config;
mod db;
mod scheduler;
mod session;
mod source;
mod web;

use config::ServerConfig;
use db::Store;
use scheduler::RefreshScheduler;
use session::DashboardSession;
use source::SampleSource;
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("statustrail=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    cfg.validate()?;
    tracing::info!("Starting statustrail on port {}...", cfg.http_port);
    tracing::info!("Reading {} source at {}", cfg.source.as_str(), cfg.source_url);

    // Open the history cache. The dashboard still works without it.
    let store = if cfg.persistence_enabled() {
        match Store::new(&cfg.db_path) {
            Ok(store) => {
                tracing::info!("Using history cache at {}", cfg.db_path);
                Some(store)
            }
            Err(e) => {
                tracing::warn!("History cache unavailable, running in memory: {}", e);
                None
            }
        }
    } else {
        tracing::info!("History cache disabled");
        None
    };

    let source = SampleSource::from_config(&cfg)?;
    let session = Arc::new(DashboardSession::new(&cfg, source, store));

    // Start scheduler
    let scheduler = Arc::new(RefreshScheduler::new(session.clone(), cfg.refresh_interval));
    let ticker = scheduler.start();

    // Start web server
    let server = Server::new(cfg, session, scheduler.clone());
    server
        .start(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown requested");
        })
        .await?;

    scheduler.shutdown().await;
    let _ = ticker.await;

    Ok(())
}
