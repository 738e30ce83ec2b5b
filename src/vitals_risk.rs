//! Vitals risk evaluation: critical-vitals flag and bounded severity boost.
//!
//! Pure functions over a `VitalsSnapshot`. Absent or unparseable readings are
//! skipped; they never count as normal or abnormal and never raise an error.

use crate::models::{BloodPressure, VitalType, VitalsSnapshot};

/// Upper bound on the total vitals boost.
pub const MAX_VITALS_BOOST: f64 = 3.0;

const HEART_RATE_HIGH: u32 = 120;
const HEART_RATE_ELEVATED: u32 = 100;
const HEART_RATE_LOW: u32 = 50;
const SPO2_CRITICAL: f64 = 90.0;
const SPO2_LOW: f64 = 95.0;
const TEMP_FEVER: f64 = 101.5;
const TEMP_HIGH_FEVER: f64 = 103.0;
const SYSTOLIC_HIGH: u32 = 180;
const DIASTOLIC_HIGH: u32 = 120;
const SYSTOLIC_LOW: u32 = 90;
const DIASTOLIC_LOW: u32 = 60;

fn bp_hypertensive_crisis(bp: BloodPressure) -> bool {
    bp.systolic > SYSTOLIC_HIGH || bp.diastolic > DIASTOLIC_HIGH
}

fn bp_hypotensive(bp: BloodPressure) -> bool {
    bp.systolic < SYSTOLIC_LOW || bp.diastolic < DIASTOLIC_LOW
}

/// True when any reading crosses a critical bar.
///
/// Tachycardia above 120 bpm contributes to the boost but does not on its own
/// mark the snapshot critical; bradycardia below 50 bpm does.
pub fn has_critical_vitals(snapshot: &VitalsSnapshot) -> bool {
    !critical_findings(snapshot).is_empty()
}

/// Human-readable description of each reading that crossed a critical bar.
pub fn critical_findings(snapshot: &VitalsSnapshot) -> Vec<String> {
    let mut findings = Vec::new();

    if let Some(hr) = snapshot.heart_rate() {
        if hr < HEART_RATE_LOW {
            findings.push(describe(VitalType::HeartRate, hr, "below", HEART_RATE_LOW));
        }
    }

    if let Some(spo2) = snapshot.oxygen_saturation() {
        if spo2 < SPO2_CRITICAL {
            findings.push(describe(VitalType::OxygenSaturation, spo2, "below", SPO2_CRITICAL));
        }
    }

    if let Some(temp) = snapshot.temperature() {
        if temp > TEMP_FEVER {
            findings.push(describe(VitalType::Temperature, temp, "above", TEMP_FEVER));
        }
    }

    if let Some(bp) = snapshot.parsed_blood_pressure() {
        if bp_hypertensive_crisis(bp) || bp_hypotensive(bp) {
            findings.push(format!(
                "{} {}/{} {} outside {}-{}/{}-{}",
                VitalType::BloodPressure.label(),
                bp.systolic,
                bp.diastolic,
                VitalType::BloodPressure.default_unit(),
                SYSTOLIC_LOW,
                SYSTOLIC_HIGH,
                DIASTOLIC_LOW,
                DIASTOLIC_HIGH,
            ));
        }
    }

    findings
}

fn describe(kind: VitalType, value: impl std::fmt::Display, side: &str, bar: impl std::fmt::Display) -> String {
    format!(
        "{} {} {} {} {}",
        kind.label(),
        value,
        kind.default_unit(),
        side,
        bar
    )
}

/// Additive severity boost from abnormal readings, clamped to [0, 3].
///
/// Each field contributes at most one bucket; contributions from different
/// fields sum before the clamp.
pub fn vitals_severity_boost(snapshot: &VitalsSnapshot) -> f64 {
    let mut boost = 0.0;

    if let Some(hr) = snapshot.heart_rate() {
        if hr > HEART_RATE_HIGH {
            boost += 2.0;
        } else if hr < HEART_RATE_LOW {
            boost += 2.5;
        } else if hr > HEART_RATE_ELEVATED {
            boost += 1.0;
        }
    }

    if let Some(spo2) = snapshot.oxygen_saturation() {
        if spo2 < SPO2_CRITICAL {
            boost += 3.0;
        } else if spo2 < SPO2_LOW {
            boost += 1.5;
        }
    }

    if let Some(temp) = snapshot.temperature() {
        if temp > TEMP_HIGH_FEVER {
            boost += 2.5;
        } else if temp > TEMP_FEVER {
            boost += 1.5;
        }
    }

    if let Some(bp) = snapshot.parsed_blood_pressure() {
        if bp_hypertensive_crisis(bp) {
            boost += 3.0;
        } else if bp_hypotensive(bp) {
            boost += 2.0;
        }
    }

    f64::clamp(boost, 0.0, MAX_VITALS_BOOST)
}
