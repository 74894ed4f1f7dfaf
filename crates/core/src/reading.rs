//! A single sampling cycle's worth of sensor data.

use chrono::Utc;
use serde::Serialize;

use crate::types::Timestamp;

/// Temperature and pen presence captured in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    pub temperature_celsius: f32,
    pub pen_present: bool,
    pub recorded_at: Timestamp,
}

impl Reading {
    /// Create a reading stamped with the current time.
    pub fn new(temperature_celsius: f32, pen_present: bool) -> Self {
        Self::at(temperature_celsius, pen_present, Utc::now())
    }

    pub fn at(temperature_celsius: f32, pen_present: bool, recorded_at: Timestamp) -> Self {
        Self {
            temperature_celsius,
            pen_present,
            recorded_at,
        }
    }

    /// Presence as the channel stores it: `1` present, `0` absent.
    pub fn presence_flag(&self) -> u8 {
        u8::from(self.pen_present)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_flag_maps_bool() {
        assert_eq!(Reading::new(5.0, true).presence_flag(), 1);
        assert_eq!(Reading::new(5.0, false).presence_flag(), 0);
    }
}
