//! Mapping between [`Reading`] values and ThingSpeak channel fields.
//!
//! A channel has eight numbered fields (`field1` .. `field8`). The reporter
//! writes temperature and presence into two of them, and the alert bridge
//! reads them back with the same mapping.

use crate::error::CoreError;
use crate::reading::Reading;
use crate::thingspeak::FeedEntry;

/// Highest field index a ThingSpeak channel exposes.
pub const MAX_FIELD: u8 = 8;

/// Which channel field carries which measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMap {
    pub temperature: u8,
    pub presence: u8,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            temperature: 1,
            presence: 2,
        }
    }
}

impl FieldMap {
    pub fn new(temperature: u8, presence: u8) -> Result<Self, CoreError> {
        for (name, idx) in [("temperature", temperature), ("presence", presence)] {
            if !(1..=MAX_FIELD).contains(&idx) {
                return Err(CoreError::Validation(format!(
                    "{name} field must be between 1 and {MAX_FIELD}, got {idx}"
                )));
            }
        }
        if temperature == presence {
            return Err(CoreError::Validation(format!(
                "temperature and presence cannot share field {temperature}"
            )));
        }
        Ok(Self {
            temperature,
            presence,
        })
    }

    /// Render a reading as ordered `(field, value)` pairs.
    ///
    /// Temperature is written with two decimals, presence as `1`/`0`.
    pub fn encode(&self, reading: &Reading) -> Vec<(u8, String)> {
        let mut fields = vec![
            (
                self.temperature,
                format!("{:.2}", reading.temperature_celsius),
            ),
            (self.presence, reading.presence_flag().to_string()),
        ];
        fields.sort_by_key(|(idx, _)| *idx);
        fields
    }

    /// Rebuild a reading from a channel feed entry.
    pub fn decode(&self, entry: &FeedEntry) -> Result<Reading, CoreError> {
        let temperature_raw = entry.field(self.temperature).ok_or(CoreError::MissingField {
            field: self.temperature,
            entry_id: entry.entry_id,
        })?;
        let presence_raw = entry.field(self.presence).ok_or(CoreError::MissingField {
            field: self.presence,
            entry_id: entry.entry_id,
        })?;

        let temperature_celsius = temperature_raw
            .trim()
            .parse::<f32>()
            .ok()
            .filter(|c| c.is_finite())
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "field{} is not a temperature: {temperature_raw:?}",
                    self.temperature
                ))
            })?;

        // Older firmware revisions wrote the flag as a float ("1.0").
        let pen_present = match presence_raw.trim() {
            "1" | "1.0" => true,
            "0" | "0.0" => false,
            other => {
                return Err(CoreError::Validation(format!(
                    "field{} is not a presence flag: {other:?}",
                    self.presence
                )))
            }
        };

        Ok(Reading::at(temperature_celsius, pen_present, entry.created_at))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;

    use super::*;

    fn entry(field1: Option<&str>, field2: Option<&str>) -> FeedEntry {
        FeedEntry {
            entry_id: 7,
            created_at: Utc::now(),
            field1: field1.map(String::from),
            field2: field2.map(String::from),
            ..FeedEntry::default()
        }
    }

    #[test]
    fn rejects_out_of_range_field() {
        assert_matches!(FieldMap::new(0, 2), Err(CoreError::Validation(_)));
        assert_matches!(FieldMap::new(1, 9), Err(CoreError::Validation(_)));
    }

    #[test]
    fn rejects_shared_field() {
        assert_matches!(FieldMap::new(3, 3), Err(CoreError::Validation(_)));
    }

    #[test]
    fn encode_orders_by_field_index() {
        let map = FieldMap::new(4, 2).unwrap();
        let fields = map.encode(&Reading::new(5.25, true));
        assert_eq!(fields, vec![(2, "1".to_string()), (4, "5.25".to_string())]);
    }

    #[test]
    fn encode_rounds_temperature_to_two_decimals() {
        let fields = FieldMap::default().encode(&Reading::new(4.567, false));
        assert_eq!(fields[0], (1, "4.57".to_string()));
        assert_eq!(fields[1], (2, "0".to_string()));
    }

    #[test]
    fn decode_reads_mapped_fields() {
        let reading = FieldMap::default()
            .decode(&entry(Some("6.50"), Some("1")))
            .unwrap();
        assert_eq!(reading.temperature_celsius, 6.5);
        assert!(reading.pen_present);
    }

    #[test]
    fn decode_accepts_float_presence() {
        let reading = FieldMap::default()
            .decode(&entry(Some("4"), Some("0.0")))
            .unwrap();
        assert!(!reading.pen_present);
    }

    #[test]
    fn decode_missing_field() {
        let err = FieldMap::default()
            .decode(&entry(Some("4.0"), None))
            .unwrap_err();
        assert_matches!(
            err,
            CoreError::MissingField {
                field: 2,
                entry_id: 7
            }
        );
    }

    #[test]
    fn decode_garbage_temperature() {
        let err = FieldMap::default()
            .decode(&entry(Some("warm"), Some("1")))
            .unwrap_err();
        assert_matches!(err, CoreError::Validation(_));
    }

    #[test]
    fn decode_rejects_non_finite_temperature() {
        for raw in ["NaN", "inf", "-infinity"] {
            let err = FieldMap::default()
                .decode(&entry(Some(raw), Some("1")))
                .unwrap_err();
            assert_matches!(err, CoreError::Validation(_), "{raw} should be rejected");
        }
    }
}
