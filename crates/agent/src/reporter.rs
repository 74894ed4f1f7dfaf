//! Sample-and-publish loop.
//!
//! Each cycle reads the temperature sensor, then the presence sensor, hands
//! the reading to the configured [`Uplink`], and logs the outcome. A failed
//! temperature read skips the publish for that cycle. Nothing is buffered or
//! retried; the loop simply waits for the next tick.

use std::time::Duration;

use penwatch_core::range::{RangeStatus, TemperatureRange};
use penwatch_core::reading::Reading;
use penwatch_core::thingspeak::WriteOutcome;
use tokio_util::sync::CancellationToken;

use crate::sensor::{PresenceSensor, SensorError, TemperatureSensor};
use crate::uplink::Uplink;

/// Default delay between cycles.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(30);

/// What happened in one cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    /// A sensor read failed; nothing was published.
    SensorFailed(SensorError),
    /// The channel stored the reading.
    Published(WriteOutcome),
    /// The server answered but did not store the reading.
    Rejected(WriteOutcome),
    /// The uplink could not complete the request.
    PublishFailed(String),
}

/// Counters accumulated over a [`Reporter::run`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReporterStats {
    pub cycles: u64,
    pub published: u64,
    pub rejected: u64,
    pub failed: u64,
    pub sensor_errors: u64,
}

impl ReporterStats {
    fn record(&mut self, outcome: &CycleOutcome) {
        self.cycles += 1;
        match outcome {
            CycleOutcome::SensorFailed(_) => self.sensor_errors += 1,
            CycleOutcome::Published(_) => self.published += 1,
            CycleOutcome::Rejected(_) => self.rejected += 1,
            CycleOutcome::PublishFailed(_) => self.failed += 1,
        }
    }
}

pub struct Reporter {
    temperature: Box<dyn TemperatureSensor>,
    presence: Box<dyn PresenceSensor>,
    uplink: Box<dyn Uplink>,
    range: TemperatureRange,
}

impl Reporter {
    pub fn new(
        temperature: Box<dyn TemperatureSensor>,
        presence: Box<dyn PresenceSensor>,
        uplink: Box<dyn Uplink>,
        range: TemperatureRange,
    ) -> Self {
        Self {
            temperature,
            presence,
            uplink,
            range,
        }
    }

    /// Read temperature, then presence.
    pub fn sample(&mut self) -> Result<Reading, SensorError> {
        let temperature = self.temperature.read_celsius()?;
        let present = self.presence.is_present()?;
        Ok(Reading::new(temperature, present))
    }

    /// Run one sample-and-publish cycle.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let reading = match self.sample() {
            Ok(reading) => reading,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read from sensors");
                return CycleOutcome::SensorFailed(e);
            }
        };

        tracing::info!(
            temperature_celsius = reading.temperature_celsius,
            pen_present = if reading.pen_present { "Yes" } else { "No" },
            "Sampled sensors",
        );

        let outcome = match self.uplink.publish(&reading).await {
            Ok(outcome) if outcome.accepted() => {
                tracing::info!(
                    uplink = self.uplink.name(),
                    entry_id = outcome.entry_id,
                    "Data push to ThingSpeak successful",
                );
                CycleOutcome::Published(outcome)
            }
            Ok(outcome) => {
                tracing::warn!(
                    uplink = self.uplink.name(),
                    status = outcome.status,
                    entry_id = outcome.entry_id,
                    "Problem pushing to ThingSpeak",
                );
                CycleOutcome::Rejected(outcome)
            }
            Err(e) => {
                tracing::error!(uplink = self.uplink.name(), error = %e, "Problem pushing to ThingSpeak");
                CycleOutcome::PublishFailed(e.to_string())
            }
        };

        match self.range.classify(reading.temperature_celsius) {
            RangeStatus::InRange => {}
            status => {
                tracing::warn!(
                    temperature_celsius = reading.temperature_celsius,
                    min_celsius = self.range.min_celsius,
                    max_celsius = self.range.max_celsius,
                    ?status,
                    "ALERT: Temperature out of range!",
                );
            }
        }

        outcome
    }

    /// Run cycles every `interval` until `cancel` fires.
    ///
    /// The first cycle runs immediately.
    pub async fn run(mut self, interval: Duration, cancel: CancellationToken) -> ReporterStats {
        let mut stats = ReporterStats::default();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(?stats, "Reporter stopping");
                    return stats;
                }
                _ = ticker.tick() => {
                    let outcome = self.run_cycle().await;
                    stats.record(&outcome);
                }
            }
        }
    }
}
