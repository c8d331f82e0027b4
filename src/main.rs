//! Daily Fortune Labeler daemon
//!
//! Serves label queries, assigns fortunes to new followers as they arrive,
//! and reconciles every follower's fortune at each civil-day boundary.

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info};

use fortune_labeler::membership::NotificationPoller;
use fortune_labeler::server::{self, AppState};
use fortune_labeler::utils::init_logging;
use fortune_labeler::{Labeler, LabelerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();
    init_logging();

    let config = LabelerConfig::from_env().context("Invalid labeler configuration")?;
    let port = config.port;
    let notification_interval = config.notification_poll_interval;
    let scheduler_settings = config.scheduler_settings();

    let labeler = Labeler::build(config).await.context("Failed to start labeler")?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Query endpoint
    let app = server::router(AppState {
        store: labeler.store.clone(),
        labeler_did: labeler.config.labeler_did.clone(),
    });
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Labeler running on port {}", port);

    let mut server_shutdown = shutdown_rx.clone();
    let server_task = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.changed().await;
            })
            .await;
        if let Err(e) = result {
            error!("Server error: {}", e);
        }
    });

    // Follow/like notifications feed the event bus
    let poller = NotificationPoller::new(labeler.client.clone(), labeler.bus.clone(), Utc::now());
    let poller_task = tokio::spawn(poller.run(notification_interval, shutdown_rx.clone()));

    let scheduler = labeler.scheduler();
    let events = labeler.bus.subscribe();
    let scheduler_task = tokio::spawn(scheduler.run(scheduler_settings, Some(events), shutdown_rx));

    tokio::signal::ctrl_c().await.context("Failed to listen for shutdown signal")?;
    info!("Shutting down");
    let _ = shutdown_tx.send(true);

    let _ = tokio::join!(server_task, poller_task, scheduler_task);
    Ok(())
}
