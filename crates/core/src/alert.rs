//! Alert evaluation for pen presence and storage temperature.
//!
//! Pure logic, no I/O. The bridge fetches the latest channel entry, turns it
//! into a [`Reading`], and passes it here; delivery is the caller's concern.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

use crate::range::{RangeStatus, TemperatureRange};
use crate::reading::Reading;
use crate::types::{EntryId, Timestamp};

/// Default minimum interval between repeated alerts of the same kind.
pub const DEFAULT_ALERT_COOLDOWN: Duration = Duration::from_secs(300);

pub const PEN_ABSENT_MESSAGE: &str = "Insulin pen missing!";

/// What condition raised the alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    PenAbsent,
    Temperature,
}

/// A single alert ready for delivery.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub message: String,
    /// Present on temperature alerts.
    pub temperature_celsius: Option<f32>,
    /// Channel entry the alert was derived from, when known.
    pub entry_id: Option<EntryId>,
    pub timestamp: Timestamp,
}

impl Alert {
    pub fn pen_absent(timestamp: Timestamp) -> Self {
        Self {
            kind: AlertKind::PenAbsent,
            message: PEN_ABSENT_MESSAGE.to_string(),
            temperature_celsius: None,
            entry_id: None,
            timestamp,
        }
    }

    pub fn temperature(celsius: f32, timestamp: Timestamp) -> Self {
        Self {
            kind: AlertKind::Temperature,
            message: format!("Temperature Alert: {celsius}°C"),
            temperature_celsius: Some(celsius),
            entry_id: None,
            timestamp,
        }
    }

    pub fn with_entry(mut self, entry_id: EntryId) -> Self {
        self.entry_id = Some(entry_id);
        self
    }
}

/// Evaluate one reading. Pen-absent comes before temperature.
pub fn evaluate(reading: &Reading, range: &TemperatureRange) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if !reading.pen_present {
        alerts.push(Alert::pen_absent(reading.recorded_at));
    }

    match range.classify(reading.temperature_celsius) {
        RangeStatus::InRange => {}
        RangeStatus::TooCold | RangeStatus::TooWarm => {
            alerts.push(Alert::temperature(
                reading.temperature_celsius,
                reading.recorded_at,
            ));
        }
    }

    alerts
}

/// Suppresses repeated alerts of the same kind within a cooldown window.
#[derive(Debug)]
pub struct AlertCooldownTracker {
    cooldown: Duration,
    last_alert: HashMap<AlertKind, Timestamp>,
}

impl Default for AlertCooldownTracker {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_COOLDOWN)
    }
}

impl AlertCooldownTracker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_alert: HashMap::new(),
        }
    }

    /// Whether `kind` is outside its cooldown at `now`.
    pub fn is_ready(&self, kind: AlertKind, now: Timestamp) -> bool {
        let Some(last) = self.last_alert.get(&kind) else {
            return true;
        };
        // Cooldowns beyond chrono's range never suppress.
        match chrono::Duration::from_std(self.cooldown) {
            Ok(cooldown) => now.signed_duration_since(*last) >= cooldown,
            Err(_) => true,
        }
    }

    /// Keep only the alerts allowed to fire at `now`. Nothing is recorded;
    /// call [`record`](Self::record) once an alert has actually gone out.
    pub fn ready(&self, alerts: Vec<Alert>, now: Timestamp) -> Vec<Alert> {
        alerts
            .into_iter()
            .filter(|alert| self.is_ready(alert.kind, now))
            .collect()
    }

    /// Start the cooldown of `kind` at `now`.
    pub fn record(&mut self, kind: AlertKind, now: Timestamp) {
        self.last_alert.insert(kind, now);
    }

    /// Forget the last emission of `kind`, e.g. after the condition cleared.
    pub fn reset(&mut self, kind: AlertKind) {
        self.last_alert.remove(&kind);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn kinds(alerts: &[Alert]) -> Vec<AlertKind> {
        alerts.iter().map(|a| a.kind).collect()
    }

    #[test]
    fn no_alerts_when_pen_present_and_in_range() {
        let alerts = evaluate(&Reading::new(5.0, true), &TemperatureRange::default());
        assert!(alerts.is_empty());
    }

    #[test]
    fn pen_absent_alert() {
        let alerts = evaluate(&Reading::new(5.0, false), &TemperatureRange::default());
        assert_eq!(kinds(&alerts), vec![AlertKind::PenAbsent]);
        assert_eq!(alerts[0].message, "Insulin pen missing!");
    }

    #[test]
    fn warm_and_absent_raise_both_in_order() {
        let alerts = evaluate(&Reading::new(9.5, false), &TemperatureRange::default());
        assert_eq!(
            kinds(&alerts),
            vec![AlertKind::PenAbsent, AlertKind::Temperature]
        );
        assert_eq!(alerts[1].message, "Temperature Alert: 9.5°C");
        assert_eq!(alerts[1].temperature_celsius, Some(9.5));
    }

    #[test]
    fn cold_raises_temperature_alert() {
        let alerts = evaluate(&Reading::new(1.0, true), &TemperatureRange::default());
        assert_eq!(kinds(&alerts), vec![AlertKind::Temperature]);
    }

    #[test]
    fn cooldown_suppresses_repeat() {
        let mut tracker = AlertCooldownTracker::default();
        let now = Utc::now();
        assert_eq!(tracker.ready(vec![Alert::pen_absent(now)], now).len(), 1);
        tracker.record(AlertKind::PenAbsent, now);

        let later = now + chrono::Duration::seconds(60);
        let second = tracker.ready(vec![Alert::pen_absent(later)], later);
        assert!(second.is_empty(), "repeat inside cooldown should be suppressed");
    }

    #[test]
    fn unrecorded_alert_stays_ready() {
        let tracker = AlertCooldownTracker::default();
        let now = Utc::now();
        tracker.ready(vec![Alert::pen_absent(now)], now);
        assert!(tracker.is_ready(AlertKind::PenAbsent, now));
    }

    #[test]
    fn cooldown_is_per_kind() {
        let mut tracker = AlertCooldownTracker::default();
        let now = Utc::now();
        tracker.record(AlertKind::PenAbsent, now);

        let passed = tracker.ready(
            vec![Alert::pen_absent(now), Alert::temperature(10.0, now)],
            now,
        );
        assert_eq!(kinds(&passed), vec![AlertKind::Temperature]);
    }

    #[test]
    fn alert_fires_again_after_cooldown() {
        let mut tracker = AlertCooldownTracker::new(Duration::from_secs(60));
        let now = Utc::now();
        tracker.record(AlertKind::PenAbsent, now);

        let later = now + chrono::Duration::seconds(61);
        assert!(!tracker.is_ready(AlertKind::PenAbsent, now + chrono::Duration::seconds(59)));
        assert!(tracker.is_ready(AlertKind::PenAbsent, later));
    }

    #[test]
    fn reset_clears_cooldown() {
        let mut tracker = AlertCooldownTracker::default();
        let now = Utc::now();
        tracker.record(AlertKind::PenAbsent, now);
        tracker.reset(AlertKind::PenAbsent);
        assert!(tracker.is_ready(AlertKind::PenAbsent, now));
    }

    #[test]
    fn alert_serializes_type_tag() {
        let alert = Alert::pen_absent(Utc::now()).with_entry(12);
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["type"], "pen_absent");
        assert_eq!(json["entry_id"], 12);
        assert!(json["temperature_celsius"].is_null());
    }
}
