//! Direct HTTP uplink using [`reqwest`].

use std::time::Duration;

use async_trait::async_trait;
use penwatch_core::fields::FieldMap;
use penwatch_core::reading::Reading;
use penwatch_core::thingspeak::{self, WriteOutcome};

use super::{Uplink, UplinkError};

/// Default HTTP request timeout for a single write.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Writes channel fields with `GET {base_url}/update?api_key=...`.
pub struct HttpUplink {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    fields: FieldMap,
}

impl HttpUplink {
    /// Create an uplink against `base_url`, e.g. `https://api.thingspeak.com`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        fields: FieldMap,
        timeout: Duration,
    ) -> Result<Self, UplinkError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url, api_key, fields))
    }

    /// Create an uplink reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        fields: FieldMap,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            fields,
        }
    }

    fn update_url(&self, reading: &Reading) -> String {
        let path = thingspeak::update_path(&self.api_key, &self.fields.encode(reading));
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl Uplink for HttpUplink {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn publish(&mut self, reading: &Reading) -> Result<WriteOutcome, UplinkError> {
        let response = self.client.get(self.update_url(reading)).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        tracing::debug!(status, body = %body.trim(), "ThingSpeak update response");
        Ok(WriteOutcome::from_response(status, &body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_url_joins_base_and_query() {
        let uplink = HttpUplink::with_client(
            reqwest::Client::new(),
            "https://api.thingspeak.com/",
            "KEY",
            FieldMap::default(),
        );
        let url = uplink.update_url(&Reading::new(4.5, true));
        assert_eq!(
            url,
            "https://api.thingspeak.com/update?api_key=KEY&field1=4.50&field2=1"
        );
    }
}
