//! `penwatch-bridge` -- turns fridge channel entries into webhook alerts.
//!
//! With `BRIDGE_INTERVAL_SECS` unset the bridge evaluates the latest entry
//! once and exits, which suits cron or a scheduled cloud job. Otherwise it
//! keeps polling until interrupted.

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use penwatch_bridge::config::BridgeConfig;
use penwatch_bridge::sync::AlertSync;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "penwatch_bridge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = BridgeConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    tracing::info!(
        channel_id = config.channel_id,
        interval_secs = config.interval.map(|d| d.as_secs()),
        cooldown_secs = config.cooldown.as_secs(),
        "Starting penwatch-bridge",
    );

    let mut sync = AlertSync::new(&config).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to set up HTTP clients");
        std::process::exit(1);
    });

    let Some(interval) = config.interval else {
        match sync.sync_once().await {
            Ok(report) => {
                tracing::info!(
                    entry_id = report.entry_id,
                    raised = report.raised,
                    delivered = report.delivered,
                    failed = report.failed,
                    "Sync complete",
                );
                if report.failed > 0 {
                    std::process::exit(1);
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Sync failed");
                std::process::exit(1);
            }
        }
        return;
    };

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
        }
        shutdown.cancel();
    });

    sync.run(interval, cancel).await;
    tracing::info!("penwatch-bridge stopped");
}
