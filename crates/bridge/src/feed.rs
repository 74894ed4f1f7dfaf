//! ThingSpeak channel feed reader.
//!
//! Wraps `GET /channels/{id}/feeds.json` using [`reqwest`]. Only the most
//! recent entry is requested; the bridge reacts to the current state of the
//! fridge, not its history.

use std::time::Duration;

use penwatch_core::thingspeak::{ChannelFeed, FeedEntry};

/// Errors from the feed read.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ThingSpeak returned a non-2xx status code.
    #[error("ThingSpeak API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// ThingSpeak answers `-1` instead of JSON for a private channel read
    /// without a valid key.
    #[error("channel {0} is private or the read key is wrong")]
    AccessDenied(u64),
}

/// HTTP client for one ThingSpeak server.
pub struct FeedClient {
    client: reqwest::Client,
    base_url: String,
}

impl FeedClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create a feed client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch the latest entry of `channel_id`. Returns `Ok(None)` when the
    /// channel has no entries yet.
    pub async fn latest(
        &self,
        channel_id: u64,
        read_key: Option<&str>,
    ) -> Result<Option<FeedEntry>, FeedError> {
        let mut request = self
            .client
            .get(format!("{}/channels/{channel_id}/feeds.json", self.base_url))
            .query(&[("results", "1")]);
        if let Some(key) = read_key {
            request = request.query(&[("api_key", key)]);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(FeedError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        if body.trim() == "-1" {
            return Err(FeedError::AccessDenied(channel_id));
        }

        let feed: ChannelFeed = serde_json::from_str(&body).map_err(|e| FeedError::ApiError {
            status: status.as_u16(),
            body: format!("unparseable feed ({e}): {body}"),
        })?;

        Ok(feed.latest().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = FeedClient::with_client(reqwest::Client::new(), "https://api.thingspeak.com/");
        assert_eq!(client.base_url, "https://api.thingspeak.com");
    }

    #[test]
    fn api_error_display() {
        let err = FeedError::ApiError {
            status: 404,
            body: "not found".into(),
        };
        assert_eq!(err.to_string(), "ThingSpeak API error (404): not found");
    }
}
