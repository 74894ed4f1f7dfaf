//! Sensor access.
//!
//! The reporter only sees the [`TemperatureSensor`] and [`PresenceSensor`]
//! traits. The adapters here read the Linux sysfs interfaces exposed by the
//! kernel drivers:
//!
//! - the `dht11` IIO driver publishes `in_temp_input` in milli-degrees
//!   Celsius and fails the read with `EIO` on a checksum or timing error;
//! - the IR beam module is wired to a GPIO whose `value` file reads `0`/`1`.

use std::fs;
use std::path::{Path, PathBuf};

/// Default IIO attribute of the first DHT11 on the system.
pub const DEFAULT_TEMP_SENSOR_PATH: &str = "/sys/bus/iio/devices/iio:device0/in_temp_input";

/// Default sysfs GPIO value file for the IR presence sensor.
pub const DEFAULT_PRESENCE_GPIO_PATH: &str = "/sys/class/gpio/gpio5/value";

/// Error type for sensor reads.
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    /// The sysfs attribute could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The attribute was readable but did not hold a usable value.
    #[error("invalid data from {path}: {raw:?}")]
    InvalidData { path: PathBuf, raw: String },
}

/// Source of temperature readings in degrees Celsius.
pub trait TemperatureSensor: Send {
    fn read_celsius(&mut self) -> Result<f32, SensorError>;
}

/// Source of the binary pen-present signal.
pub trait PresenceSensor: Send {
    fn is_present(&mut self) -> Result<bool, SensorError>;
}

fn read_attr(path: &Path) -> Result<String, SensorError> {
    fs::read_to_string(path)
        .map(|raw| raw.trim().to_string())
        .map_err(|source| SensorError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Temperature from an IIO `in_temp_input` attribute (milli-degrees).
#[derive(Debug, Clone)]
pub struct IioTemperatureSensor {
    path: PathBuf,
}

impl IioTemperatureSensor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TemperatureSensor for IioTemperatureSensor {
    fn read_celsius(&mut self) -> Result<f32, SensorError> {
        let raw = read_attr(&self.path)?;
        let millis: f32 = raw.parse().map_err(|_| SensorError::InvalidData {
            path: self.path.clone(),
            raw: raw.clone(),
        })?;
        if !millis.is_finite() {
            return Err(SensorError::InvalidData {
                path: self.path.clone(),
                raw,
            });
        }
        Ok(millis / 1000.0)
    }
}

/// Pen presence from a sysfs GPIO `value` file.
///
/// The IR module pulls its output LOW while the beam is reflected by the pen,
/// so `active_low` is the usual wiring.
#[derive(Debug, Clone)]
pub struct GpioPresenceSensor {
    path: PathBuf,
    active_low: bool,
}

impl GpioPresenceSensor {
    pub fn new(path: impl Into<PathBuf>, active_low: bool) -> Self {
        Self {
            path: path.into(),
            active_low,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PresenceSensor for GpioPresenceSensor {
    fn is_present(&mut self) -> Result<bool, SensorError> {
        let raw = read_attr(&self.path)?;
        let high = match raw.as_str() {
            "1" => true,
            "0" => false,
            _ => {
                return Err(SensorError::InvalidData {
                    path: self.path.clone(),
                    raw,
                })
            }
        };
        Ok(high != self.active_low)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;
    use tempfile::NamedTempFile;

    use super::*;

    fn attr(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{contents}").unwrap();
        file
    }

    #[test]
    fn iio_reads_millidegrees() {
        let file = attr("4500\n");
        let mut sensor = IioTemperatureSensor::new(file.path());
        assert_eq!(sensor.read_celsius().unwrap(), 4.5);
    }

    #[test]
    fn iio_negative_temperature() {
        let file = attr("-1250");
        let mut sensor = IioTemperatureSensor::new(file.path());
        assert_eq!(sensor.read_celsius().unwrap(), -1.25);
    }

    #[test]
    fn iio_rejects_garbage() {
        let file = attr("n/a");
        let mut sensor = IioTemperatureSensor::new(file.path());
        assert_matches!(sensor.read_celsius(), Err(SensorError::InvalidData { .. }));
    }

    #[test]
    fn iio_rejects_nan() {
        let file = attr("NaN");
        let mut sensor = IioTemperatureSensor::new(file.path());
        assert_matches!(sensor.read_celsius(), Err(SensorError::InvalidData { .. }));
    }

    #[test]
    fn iio_missing_file_is_io_error() {
        let mut sensor = IioTemperatureSensor::new("/nonexistent/in_temp_input");
        assert_matches!(sensor.read_celsius(), Err(SensorError::Io { .. }));
    }

    #[test]
    fn gpio_active_low_maps_low_to_present() {
        let low = attr("0\n");
        let high = attr("1\n");
        assert!(GpioPresenceSensor::new(low.path(), true).is_present().unwrap());
        assert!(!GpioPresenceSensor::new(high.path(), true).is_present().unwrap());
    }

    #[test]
    fn gpio_active_high() {
        let high = attr("1");
        assert!(GpioPresenceSensor::new(high.path(), false).is_present().unwrap());
    }

    #[test]
    fn gpio_rejects_unexpected_value() {
        let file = attr("2");
        let mut sensor = GpioPresenceSensor::new(file.path(), true);
        assert_matches!(sensor.is_present(), Err(SensorError::InvalidData { .. }));
    }
}
