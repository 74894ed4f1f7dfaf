//! `penwatch-agent` -- insulin pen fridge reporter.
//!
//! Samples a DHT11 temperature sensor and an IR presence sensor every
//! `REPORT_INTERVAL_SECS` and writes both values to a ThingSpeak channel,
//! either directly over HTTP or through an AT-command serial modem.
//! See [`AgentConfig`] for the full list of environment variables.

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use penwatch_agent::config::{AgentConfig, UplinkKind};
use penwatch_agent::reporter::Reporter;
use penwatch_agent::sensor::{GpioPresenceSensor, IioTemperatureSensor};
use penwatch_agent::uplink::modem::{self, AtModem, ModemUplink};
use penwatch_agent::uplink::{HttpUplink, Uplink};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "penwatch_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AgentConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    tracing::info!(
        uplink = ?config.uplink,
        channel_id = config.channel_id,
        interval_secs = config.interval.as_secs(),
        temp_sensor = %config.temp_sensor_path.display(),
        presence_gpio = %config.presence_gpio_path.display(),
        "Starting penwatch-agent",
    );

    let uplink = build_uplink(&config).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to set up uplink");
        std::process::exit(1);
    });

    let reporter = Reporter::new(
        Box::new(IioTemperatureSensor::new(config.temp_sensor_path.clone())),
        Box::new(GpioPresenceSensor::new(
            config.presence_gpio_path.clone(),
            config.presence_active_low,
        )),
        uplink,
        config.range,
    );

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
        }
        shutdown.cancel();
    });

    let stats = reporter.run(config.interval, cancel).await;
    tracing::info!(
        cycles = stats.cycles,
        published = stats.published,
        rejected = stats.rejected,
        failed = stats.failed,
        sensor_errors = stats.sensor_errors,
        "penwatch-agent stopped",
    );
}

fn build_uplink(config: &AgentConfig) -> Result<Box<dyn Uplink>, Box<dyn std::error::Error>> {
    match (config.uplink, &config.modem) {
        (UplinkKind::Modem, Some(modem_config)) => {
            let port = modem::open_serial(&modem_config.port, modem_config.baud_rate)?;
            tracing::info!(port = %modem_config.port, baud = modem_config.baud_rate, "Serial port open");
            let modem = AtModem::new(port, modem_config.command_timeout);
            Ok(Box::new(ModemUplink::new(
                modem,
                modem_config.host.clone(),
                modem_config.tcp_port,
                config.api_key.clone(),
                config.fields,
            )))
        }
        _ => Ok(Box::new(HttpUplink::new(
            config.base_url.clone(),
            config.api_key.clone(),
            config.fields,
            config.http_timeout,
        )?)),
    }
}
