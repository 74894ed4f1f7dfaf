use std::time::Duration;

use penwatch_core::alert::DEFAULT_ALERT_COOLDOWN;
use penwatch_core::config::{ConfigError, EnvLookup};
use penwatch_core::fields::FieldMap;
use penwatch_core::range::{TemperatureRange, DEFAULT_MAX_CELSIUS, DEFAULT_MIN_CELSIUS};
use penwatch_core::thingspeak::{self, DEFAULT_BASE_URL};

use crate::delivery::DEFAULT_REQUEST_TIMEOUT;

/// Bridge configuration loaded from environment variables.
///
/// | Env Var                | Default                      |
/// |------------------------|------------------------------|
/// | `THINGSPEAK_CHANNEL_ID`| required                     |
/// | `ALERT_WEBHOOK_URL`    | required                     |
/// | `THINGSPEAK_READ_KEY`  | unset (public channel)       |
/// | `THINGSPEAK_URL`       | `https://api.thingspeak.com` |
/// | `BRIDGE_INTERVAL_SECS` | unset (run once and exit)    |
/// | `ALERT_COOLDOWN_SECS`  | `300`                        |
/// | `HTTP_TIMEOUT_SECS`    | `10`                         |
/// | `TEMP_FIELD`           | `1`                          |
/// | `PRESENCE_FIELD`       | `2`                          |
/// | `TEMP_MIN_CELSIUS`     | `2.0`                        |
/// | `TEMP_MAX_CELSIUS`     | `8.0`                        |
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub base_url: String,
    pub channel_id: u64,
    pub read_key: Option<String>,
    pub webhook_url: String,
    /// `None` runs a single sync and exits.
    pub interval: Option<Duration>,
    pub cooldown: Duration,
    pub request_timeout: Duration,
    pub fields: FieldMap,
    pub range: TemperatureRange,
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvLookup::new(lookup);

        let channel_id = env.optional::<u64>("THINGSPEAK_CHANNEL_ID")?;
        let channel_id = channel_id.ok_or(ConfigError::Missing("THINGSPEAK_CHANNEL_ID"))?;

        let read_key = env.get("THINGSPEAK_READ_KEY");
        if let Some(key) = &read_key {
            if !thingspeak::is_valid_api_key(key) {
                return Err(ConfigError::Invalid {
                    var: "THINGSPEAK_READ_KEY",
                    value: key.clone(),
                    reason: "must be 1-64 ASCII alphanumerics".into(),
                });
            }
        }

        let webhook_url = env.required("ALERT_WEBHOOK_URL")?;
        if !(webhook_url.starts_with("http://") || webhook_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                var: "ALERT_WEBHOOK_URL",
                value: webhook_url,
                reason: "must be an http(s) URL".into(),
            });
        }

        let interval = env.optional_secs("BRIDGE_INTERVAL_SECS")?;
        if interval.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::Invalid {
                var: "BRIDGE_INTERVAL_SECS",
                value: "0".into(),
                reason: "must be at least 1 second; unset it to run once".into(),
            });
        }

        let fields = FieldMap::new(
            env.parsed("TEMP_FIELD", FieldMap::default().temperature)?,
            env.parsed("PRESENCE_FIELD", FieldMap::default().presence)?,
        )
        .map_err(|e| ConfigError::Invalid {
            var: "TEMP_FIELD",
            value: env.string("TEMP_FIELD", ""),
            reason: e.to_string(),
        })?;

        let range = TemperatureRange::new(
            env.parsed("TEMP_MIN_CELSIUS", DEFAULT_MIN_CELSIUS)?,
            env.parsed("TEMP_MAX_CELSIUS", DEFAULT_MAX_CELSIUS)?,
        )
        .map_err(|e| ConfigError::Invalid {
            var: "TEMP_MIN_CELSIUS",
            value: env.string("TEMP_MIN_CELSIUS", ""),
            reason: e.to_string(),
        })?;

        Ok(Self {
            base_url: env.string("THINGSPEAK_URL", DEFAULT_BASE_URL),
            channel_id,
            read_key,
            webhook_url,
            interval,
            cooldown: env.secs("ALERT_COOLDOWN_SECS", DEFAULT_ALERT_COOLDOWN)?,
            request_timeout: env.secs("HTTP_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT)?,
            fields,
            range,
        })
    }
}
