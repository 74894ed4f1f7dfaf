//! Feed-to-webhook alert sync.
//!
//! [`AlertSync::sync_once`] reads the newest channel entry, evaluates it
//! against the pen-presence and temperature rules, and posts each alert to
//! the configured webhook. An entry is evaluated at most once; repeated
//! alerts of the same kind are further throttled by the cooldown tracker.

use std::time::Duration;

use chrono::Utc;
use penwatch_core::alert::{self, AlertCooldownTracker, AlertKind};
use penwatch_core::fields::FieldMap;
use penwatch_core::range::TemperatureRange;
use penwatch_core::types::EntryId;
use penwatch_core::CoreError;
use tokio_util::sync::CancellationToken;

use crate::config::BridgeConfig;
use crate::delivery::{RetryPolicy, WebhookDelivery, WebhookError};
use crate::feed::{FeedClient, FeedError};

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("feed read failed: {0}")]
    Feed(#[from] FeedError),

    #[error("could not set up webhook client: {0}")]
    Webhook(#[from] WebhookError),

    #[error("channel {0} has no entries yet")]
    EmptyFeed(u64),

    #[error("entry does not hold a reading: {0}")]
    Decode(#[from] CoreError),
}

/// Result of a single sync pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub entry_id: EntryId,
    /// The entry was already evaluated by an earlier pass.
    pub already_seen: bool,
    /// Alerts produced by the rules, before cooldown.
    pub raised: usize,
    /// Alerts dropped by the cooldown.
    pub suppressed: usize,
    pub delivered: usize,
    pub failed: usize,
}

pub struct AlertSync {
    feed: FeedClient,
    delivery: WebhookDelivery,
    channel_id: u64,
    read_key: Option<String>,
    webhook_url: String,
    fields: FieldMap,
    range: TemperatureRange,
    cooldown: AlertCooldownTracker,
    last_entry_id: Option<EntryId>,
}

impl AlertSync {
    /// Build the sync with HTTP clients derived from `config`.
    pub fn new(config: &BridgeConfig) -> Result<Self, BridgeError> {
        let feed = FeedClient::new(config.base_url.clone(), config.request_timeout)?;
        let delivery =
            WebhookDelivery::new(config.request_timeout)?.with_retry(RetryPolicy::default());
        Ok(Self::from_parts(config, feed, delivery))
    }

    pub fn from_parts(config: &BridgeConfig, feed: FeedClient, delivery: WebhookDelivery) -> Self {
        Self {
            feed,
            delivery,
            channel_id: config.channel_id,
            read_key: config.read_key.clone(),
            webhook_url: config.webhook_url.clone(),
            fields: config.fields,
            range: config.range,
            cooldown: AlertCooldownTracker::new(config.cooldown),
            last_entry_id: None,
        }
    }

    /// Evaluate the latest channel entry and deliver its alerts.
    pub async fn sync_once(&mut self) -> Result<SyncReport, BridgeError> {
        let entry = self
            .feed
            .latest(self.channel_id, self.read_key.as_deref())
            .await?
            .ok_or(BridgeError::EmptyFeed(self.channel_id))?;

        if self.last_entry_id == Some(entry.entry_id) {
            tracing::debug!(entry_id = entry.entry_id, "No new channel entry");
            return Ok(SyncReport {
                entry_id: entry.entry_id,
                already_seen: true,
                ..SyncReport::default()
            });
        }
        self.last_entry_id = Some(entry.entry_id);

        let reading = self.fields.decode(&entry)?;
        tracing::info!(
            entry_id = entry.entry_id,
            temperature_celsius = reading.temperature_celsius,
            pen_present = reading.pen_present,
            "Evaluating channel entry",
        );

        let raised = alert::evaluate(&reading, &self.range);

        // A cleared condition re-arms its alert.
        for kind in [AlertKind::PenAbsent, AlertKind::Temperature] {
            if !raised.iter().any(|a| a.kind == kind) {
                self.cooldown.reset(kind);
            }
        }

        let now = Utc::now();
        let raised_count = raised.len();
        let passed = self.cooldown.ready(raised, now);

        let mut report = SyncReport {
            entry_id: entry.entry_id,
            already_seen: false,
            raised: raised_count,
            suppressed: raised_count - passed.len(),
            delivered: 0,
            failed: 0,
        };

        for alert in passed {
            let alert = alert.with_entry(entry.entry_id);
            match self.delivery.deliver(&self.webhook_url, &alert).await {
                Ok(()) => {
                    tracing::info!(kind = ?alert.kind, message = %alert.message, "Alert delivered");
                    // Only delivered alerts start the cooldown.
                    self.cooldown.record(alert.kind, now);
                    report.delivered += 1;
                }
                Err(e) => {
                    tracing::error!(kind = ?alert.kind, error = %e, "Alert delivery failed");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Sync every `interval` until `cancel` fires. Errors are logged and the
    /// next pass proceeds normally.
    pub async fn run(mut self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Alert sync stopping");
                    return;
                }
                _ = ticker.tick() => {
                    match self.sync_once().await {
                        Ok(report) => tracing::debug!(?report, "Sync pass complete"),
                        Err(e) => tracing::error!(error = %e, "Sync pass failed"),
                    }
                }
            }
        }
    }
}
