use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

/// Type of vital sign carried by a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VitalType {
    HeartRate,
    BloodPressure,
    Temperature,
    OxygenSaturation,
    RespiratoryRate,
    HeartRateVariability,
}

impl VitalType {
    pub fn as_str(self) -> &'static str {
        match self {
            VitalType::HeartRate => "heart_rate",
            VitalType::BloodPressure => "blood_pressure",
            VitalType::Temperature => "temperature",
            VitalType::OxygenSaturation => "oxygen_saturation",
            VitalType::RespiratoryRate => "respiratory_rate",
            VitalType::HeartRateVariability => "heart_rate_variability",
        }
    }

    /// Label used when vitals are rendered for the model.
    pub fn label(self) -> &'static str {
        match self {
            VitalType::HeartRate => "Heart rate",
            VitalType::BloodPressure => "Blood pressure",
            VitalType::Temperature => "Temperature",
            VitalType::OxygenSaturation => "Oxygen saturation",
            VitalType::RespiratoryRate => "Respiratory rate",
            VitalType::HeartRateVariability => "Heart rate variability",
        }
    }

    /// Default unit for this vital type.
    pub fn default_unit(self) -> &'static str {
        match self {
            VitalType::HeartRate => "bpm",
            VitalType::BloodPressure => "mmHg",
            VitalType::Temperature => "°F",
            VitalType::OxygenSaturation => "%",
            VitalType::RespiratoryRate => "breaths/min",
            VitalType::HeartRateVariability => "ms",
        }
    }
}

static BLOOD_PRESSURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d{1,3})\s*/\s*(\d{1,3})\s*$").unwrap());

/// A parsed "systolic/diastolic" reading in mmHg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BloodPressure {
    pub systolic: u32,
    pub diastolic: u32,
}

impl BloodPressure {
    /// Parse "S/D". Anything else (including non-numeric halves) is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let caps = BLOOD_PRESSURE.captures(raw)?;
        Some(Self {
            systolic: caps[1].parse().ok()?,
            diastolic: caps[2].parse().ok()?,
        })
    }
}

/// One observation of a patient's physiological state.
///
/// Every clinical field is independently optional: `None` means the reading
/// is unknown, never that it is normal. Fields are private so a snapshot
/// cannot change after construction; the `with_*` builders consume the value
/// and return a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalsSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    heart_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    blood_pressure: Option<String>,
    /// Degrees Fahrenheit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    oxygen_saturation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    respiratory_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    heart_rate_variability: Option<f64>,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    device_source: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "clamped_quality"
    )]
    data_quality: Option<f64>,
}

/// Exports clamp the same way `with_data_quality` does.
fn clamped_quality<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.map(|q| q.clamp(0.0, 1.0)))
}

impl VitalsSnapshot {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            heart_rate: None,
            blood_pressure: None,
            temperature: None,
            oxygen_saturation: None,
            respiratory_rate: None,
            heart_rate_variability: None,
            timestamp,
            device_source: None,
            data_quality: None,
        }
    }

    /// Snapshot stamped with the current time.
    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    pub fn with_heart_rate(mut self, bpm: u32) -> Self {
        self.heart_rate = Some(bpm);
        self
    }

    pub fn with_blood_pressure(mut self, reading: impl Into<String>) -> Self {
        self.blood_pressure = Some(reading.into());
        self
    }

    pub fn with_temperature(mut self, fahrenheit: f64) -> Self {
        self.temperature = Some(fahrenheit);
        self
    }

    pub fn with_oxygen_saturation(mut self, percent: f64) -> Self {
        self.oxygen_saturation = Some(percent);
        self
    }

    pub fn with_respiratory_rate(mut self, per_minute: u32) -> Self {
        self.respiratory_rate = Some(per_minute);
        self
    }

    pub fn with_heart_rate_variability(mut self, ms: f64) -> Self {
        self.heart_rate_variability = Some(ms);
        self
    }

    pub fn with_device_source(mut self, source: impl Into<String>) -> Self {
        self.device_source = Some(source.into());
        self
    }

    /// Quality score, clamped to [0, 1].
    pub fn with_data_quality(mut self, quality: f64) -> Self {
        self.data_quality = Some(quality.clamp(0.0, 1.0));
        self
    }

    pub fn heart_rate(&self) -> Option<u32> {
        self.heart_rate
    }

    pub fn blood_pressure(&self) -> Option<&str> {
        self.blood_pressure.as_deref()
    }

    /// Blood pressure parsed as "S/D"; `None` when absent or unparseable.
    pub fn parsed_blood_pressure(&self) -> Option<BloodPressure> {
        self.blood_pressure.as_deref().and_then(BloodPressure::parse)
    }

    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    pub fn oxygen_saturation(&self) -> Option<f64> {
        self.oxygen_saturation
    }

    pub fn respiratory_rate(&self) -> Option<u32> {
        self.respiratory_rate
    }

    pub fn heart_rate_variability(&self) -> Option<f64> {
        self.heart_rate_variability
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn device_source(&self) -> Option<&str> {
        self.device_source.as_deref()
    }

    pub fn data_quality(&self) -> Option<f64> {
        self.data_quality
    }

    /// Readings present in this snapshot, as (type, display value) pairs in a
    /// fixed order.
    pub fn readings(&self) -> Vec<(VitalType, String)> {
        let mut out = Vec::new();
        if let Some(hr) = self.heart_rate {
            out.push((VitalType::HeartRate, hr.to_string()));
        }
        if let Some(bp) = &self.blood_pressure {
            out.push((VitalType::BloodPressure, bp.trim().to_string()));
        }
        if let Some(t) = self.temperature {
            out.push((VitalType::Temperature, format!("{t:.1}")));
        }
        if let Some(spo2) = self.oxygen_saturation {
            out.push((VitalType::OxygenSaturation, format!("{spo2:.0}")));
        }
        if let Some(rr) = self.respiratory_rate {
            out.push((VitalType::RespiratoryRate, rr.to_string()));
        }
        if let Some(hrv) = self.heart_rate_variability {
            out.push((VitalType::HeartRateVariability, format!("{hrv:.0}")));
        }
        out
    }

    /// True when no clinical reading is present.
    pub fn is_empty(&self) -> bool {
        self.readings().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blood_pressure_parses_systolic_diastolic() {
        let bp = BloodPressure::parse("120/80").unwrap();
        assert_eq!(bp.systolic, 120);
        assert_eq!(bp.diastolic, 80);
        assert_eq!(
            BloodPressure::parse(" 190 / 130 "),
            Some(BloodPressure { systolic: 190, diastolic: 130 })
        );
    }

    #[test]
    fn blood_pressure_rejects_garbage() {
        assert_eq!(BloodPressure::parse("not-a-number/80"), None);
        assert_eq!(BloodPressure::parse("120"), None);
        assert_eq!(BloodPressure::parse("120/80/60"), None);
        assert_eq!(BloodPressure::parse(""), None);
        assert_eq!(BloodPressure::parse("-120/80"), None);
    }

    #[test]
    fn builder_produces_new_values() {
        let base = VitalsSnapshot::now();
        let with_hr = base.clone().with_heart_rate(72);
        assert_eq!(base.heart_rate(), None);
        assert_eq!(with_hr.heart_rate(), Some(72));
        assert_eq!(base.timestamp(), with_hr.timestamp());
    }

    #[test]
    fn data_quality_is_clamped() {
        assert_eq!(VitalsSnapshot::now().with_data_quality(1.7).data_quality(), Some(1.0));
        assert_eq!(VitalsSnapshot::now().with_data_quality(-0.2).data_quality(), Some(0.0));
    }

    #[test]
    fn deserialized_data_quality_is_clamped() {
        let high: VitalsSnapshot = serde_json::from_str(
            r#"{"heartRate": 80, "timestamp": "2024-05-01T10:00:00Z", "dataQuality": 1.7}"#,
        )
        .unwrap();
        assert_eq!(high.data_quality(), Some(1.0));

        let low: VitalsSnapshot = serde_json::from_str(
            r#"{"timestamp": "2024-05-01T10:00:00Z", "dataQuality": -3}"#,
        )
        .unwrap();
        assert_eq!(low.data_quality(), Some(0.0));

        let absent: VitalsSnapshot =
            serde_json::from_str(r#"{"timestamp": "2024-05-01T10:00:00Z"}"#).unwrap();
        assert_eq!(absent.data_quality(), None);
    }

    #[test]
    fn empty_snapshot_has_no_readings() {
        let snap = VitalsSnapshot::now().with_device_source("watch");
        assert!(snap.is_empty());
        assert!(!snap.with_temperature(98.6).is_empty());
    }

    #[test]
    fn readings_keep_fixed_order() {
        let snap = VitalsSnapshot::now()
            .with_oxygen_saturation(97.0)
            .with_heart_rate(88)
            .with_blood_pressure("118/76");
        let kinds: Vec<VitalType> = snap.readings().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            kinds,
            vec![VitalType::HeartRate, VitalType::BloodPressure, VitalType::OxygenSaturation]
        );
    }

    #[test]
    fn serde_uses_camel_case_and_skips_absent() {
        let snap = VitalsSnapshot::now()
            .with_heart_rate(101)
            .with_oxygen_saturation(94.0);
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["heartRate"], 101);
        assert_eq!(json["oxygenSaturation"], 94.0);
        assert!(json.get("bloodPressure").is_none());

        let back: VitalsSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snap);
    }

    #[test]
    fn deserializes_wearable_export_with_missing_fields() {
        let json = r#"{"timestamp":"2026-03-01T10:00:00Z","heartRate":64,"deviceSource":"ring"}"#;
        let snap: VitalsSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snap.heart_rate(), Some(64));
        assert_eq!(snap.device_source(), Some("ring"));
        assert_eq!(snap.temperature(), None);
    }
}
