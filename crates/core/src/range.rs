//! Safe storage temperature range.

use serde::Serialize;

use crate::error::CoreError;

/// Lower bound of the refrigerated insulin storage range.
pub const DEFAULT_MIN_CELSIUS: f32 = 2.0;

/// Upper bound of the refrigerated insulin storage range.
pub const DEFAULT_MAX_CELSIUS: f32 = 8.0;

/// Inclusive temperature band considered safe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureRange {
    pub min_celsius: f32,
    pub max_celsius: f32,
}

/// Where a temperature falls relative to a [`TemperatureRange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeStatus {
    TooCold,
    InRange,
    TooWarm,
}

impl Default for TemperatureRange {
    fn default() -> Self {
        Self {
            min_celsius: DEFAULT_MIN_CELSIUS,
            max_celsius: DEFAULT_MAX_CELSIUS,
        }
    }
}

impl TemperatureRange {
    pub fn new(min_celsius: f32, max_celsius: f32) -> Result<Self, CoreError> {
        if !min_celsius.is_finite() || !max_celsius.is_finite() {
            return Err(CoreError::Validation(
                "temperature bounds must be finite".into(),
            ));
        }
        if min_celsius >= max_celsius {
            return Err(CoreError::Validation(format!(
                "minimum {min_celsius} must be below maximum {max_celsius}"
            )));
        }
        Ok(Self {
            min_celsius,
            max_celsius,
        })
    }

    /// Classify a temperature. NaN is reported as in range so that a failed
    /// read never raises a temperature alert on its own.
    pub fn classify(&self, celsius: f32) -> RangeStatus {
        if celsius < self.min_celsius {
            RangeStatus::TooCold
        } else if celsius > self.max_celsius {
            RangeStatus::TooWarm
        } else {
            RangeStatus::InRange
        }
    }

    pub fn contains(&self, celsius: f32) -> bool {
        self.classify(celsius) == RangeStatus::InRange
    }
}
