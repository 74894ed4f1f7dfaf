//! Alert webhook delivery.
//!
//! Each [`Alert`] is POSTed as JSON. A failed POST is retried after each
//! delay in the [`RetryPolicy`]; the default backs off 1 s, 2 s, then 4 s.

use std::time::Duration;

use penwatch_core::alert::Alert;

const DEFAULT_BACKOFF_SECS: [u64; 3] = [1, 2, 4];

/// Timeout applied to each POST (and to feed reads, via the bridge config).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Any non-2xx answer from the receiver.
    #[error("webhook answered {0}")]
    Status(u16),
}

/// Backoff schedule between delivery attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delays: DEFAULT_BACKOFF_SECS.map(Duration::from_secs).to_vec(),
        }
    }
}

impl RetryPolicy {
    /// Give up after the first failure.
    pub fn none() -> Self {
        Self { delays: Vec::new() }
    }

    pub fn attempts(&self) -> usize {
        self.delays.len() + 1
    }
}

pub struct WebhookDelivery {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl WebhookDelivery {
    pub fn new(timeout: Duration) -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// POST `alert` to `url`, retrying per the policy. The error of the
    /// last attempt is returned once every attempt has failed.
    pub async fn deliver(&self, url: &str, alert: &Alert) -> Result<(), WebhookError> {
        for (attempt, delay) in self.retry.delays.iter().enumerate() {
            match self.post(url, alert).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::warn!(
                        kind = ?alert.kind,
                        attempt = attempt + 1,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %err,
                        "Alert webhook attempt failed",
                    );
                    tokio::time::sleep(*delay).await;
                }
            }
        }

        self.post(url, alert).await.inspect_err(|err| {
            tracing::error!(
                kind = ?alert.kind,
                attempts = self.retry.attempts(),
                error = %err,
                "Giving up on alert webhook",
            );
        })
    }

    async fn post(&self, url: &str, alert: &Alert) -> Result<(), WebhookError> {
        let status = self.client.post(url).json(alert).send().await?.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(WebhookError::Status(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delays,
            [1, 2, 4].map(Duration::from_secs).to_vec()
        );
        assert_eq!(policy.attempts(), 4);
    }

    #[test]
    fn no_retry_is_single_attempt() {
        assert_eq!(RetryPolicy::none().attempts(), 1);
    }

    #[test]
    fn status_error_names_code() {
        assert_eq!(WebhookError::Status(502).to_string(), "webhook answered 502");
    }
}
