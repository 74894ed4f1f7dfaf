use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use penwatch_core::config::{ConfigError, EnvLookup};
use penwatch_core::fields::FieldMap;
use penwatch_core::range::{TemperatureRange, DEFAULT_MAX_CELSIUS, DEFAULT_MIN_CELSIUS};
use penwatch_core::thingspeak::{self, DEFAULT_BASE_URL, DEFAULT_HOST};

use crate::reporter::DEFAULT_REPORT_INTERVAL;
use crate::sensor::{DEFAULT_PRESENCE_GPIO_PATH, DEFAULT_TEMP_SENSOR_PATH};
use crate::uplink::http::DEFAULT_HTTP_TIMEOUT;
use crate::uplink::modem::{DEFAULT_BAUD_RATE, DEFAULT_COMMAND_TIMEOUT};

/// How readings leave the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UplinkKind {
    Http,
    Modem,
}

impl FromStr for UplinkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" | "wifi" => Ok(Self::Http),
            "modem" | "serial" | "at" => Ok(Self::Modem),
            other => Err(format!("expected `http` or `modem`, got `{other}`")),
        }
    }
}

/// Serial modem settings, only read when `UPLINK=modem`.
#[derive(Debug, Clone)]
pub struct ModemConfig {
    pub port: String,
    pub baud_rate: u32,
    pub command_timeout: Duration,
    pub host: String,
    pub tcp_port: u16,
}

/// Reporter configuration loaded from environment variables.
///
/// | Env Var                | Default                                          |
/// |------------------------|--------------------------------------------------|
/// | `THINGSPEAK_API_KEY`   | required                                         |
/// | `THINGSPEAK_CHANNEL_ID`| unset (logged only)                              |
/// | `UPLINK`               | `http`                                           |
/// | `THINGSPEAK_URL`       | `https://api.thingspeak.com`                     |
/// | `HTTP_TIMEOUT_SECS`    | `10`                                             |
/// | `MODEM_PORT`           | required when `UPLINK=modem`                     |
/// | `MODEM_BAUD`           | `115200`                                         |
/// | `MODEM_TIMEOUT_SECS`   | `10`                                             |
/// | `THINGSPEAK_HOST`      | `api.thingspeak.com`                             |
/// | `THINGSPEAK_PORT`      | `80`                                             |
/// | `TEMP_SENSOR_PATH`     | `/sys/bus/iio/devices/iio:device0/in_temp_input` |
/// | `PRESENCE_GPIO_PATH`   | `/sys/class/gpio/gpio5/value`                    |
/// | `PRESENCE_ACTIVE_LOW`  | `true`                                           |
/// | `REPORT_INTERVAL_SECS` | `30`                                             |
/// | `TEMP_FIELD`           | `1`                                              |
/// | `PRESENCE_FIELD`       | `2`                                              |
/// | `TEMP_MIN_CELSIUS`     | `2.0`                                            |
/// | `TEMP_MAX_CELSIUS`     | `8.0`                                            |
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub api_key: String,
    pub channel_id: Option<u64>,
    pub uplink: UplinkKind,
    pub base_url: String,
    pub http_timeout: Duration,
    pub modem: Option<ModemConfig>,
    pub temp_sensor_path: PathBuf,
    pub presence_gpio_path: PathBuf,
    pub presence_active_low: bool,
    pub interval: Duration,
    pub fields: FieldMap,
    pub range: TemperatureRange,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvLookup::new(lookup);

        let api_key = env.required("THINGSPEAK_API_KEY")?;
        if !thingspeak::is_valid_api_key(&api_key) {
            return Err(ConfigError::Invalid {
                var: "THINGSPEAK_API_KEY",
                value: api_key,
                reason: "must be 1-64 ASCII alphanumerics".into(),
            });
        }

        let uplink = env.parsed("UPLINK", UplinkKind::Http)?;

        let modem = match uplink {
            UplinkKind::Http => None,
            UplinkKind::Modem => Some(ModemConfig {
                port: env.required("MODEM_PORT")?,
                baud_rate: env.parsed("MODEM_BAUD", DEFAULT_BAUD_RATE)?,
                command_timeout: env.secs("MODEM_TIMEOUT_SECS", DEFAULT_COMMAND_TIMEOUT)?,
                host: env.string("THINGSPEAK_HOST", DEFAULT_HOST),
                tcp_port: env.parsed("THINGSPEAK_PORT", 80)?,
            }),
        };

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

        let interval = env.secs("REPORT_INTERVAL_SECS", DEFAULT_REPORT_INTERVAL)?;
        if interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "REPORT_INTERVAL_SECS",
                value: "0".into(),
                reason: "must be at least 1 second".into(),
            });
        }

        Ok(Self {
            api_key,
            channel_id: env.optional("THINGSPEAK_CHANNEL_ID")?,
            uplink,
            base_url: env.string("THINGSPEAK_URL", DEFAULT_BASE_URL),
            http_timeout: env.secs("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT)?,
            modem,
            temp_sensor_path: env.string("TEMP_SENSOR_PATH", DEFAULT_TEMP_SENSOR_PATH).into(),
            presence_gpio_path: env.string("PRESENCE_GPIO_PATH", DEFAULT_PRESENCE_GPIO_PATH).into(),
            presence_active_low: env.parsed("PRESENCE_ACTIVE_LOW", true)?,
            interval,
            fields,
            range,
        })
    }
}
