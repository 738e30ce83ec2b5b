use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::UrgencyLevel;
use super::vital_sign::VitalsSnapshot;

/// Validated verdict returned by the AI provider, before vitals fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageVerdict {
    /// 0-10, may be fractional.
    pub severity_score: f64,
    pub confidence_lower: f64,
    pub confidence_upper: f64,
    pub explanation: String,
    pub key_symptoms: Vec<String>,
    pub concerning_findings: Vec<String>,
    pub recommended_actions: Vec<String>,
    pub urgency_level: UrgencyLevel,
    pub time_to_treatment: String,
}

/// Final assessment handed to persistence and presentation.
///
/// Produced once per completed assessment. A correction is a new result with
/// a new `assessment_id`, never an edit of this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageResult {
    pub assessment_id: Uuid,
    pub severity_score: f64,
    /// Score the model assigned before the vitals boost.
    pub ai_severity_score: f64,
    pub confidence_lower: f64,
    pub confidence_upper: f64,
    pub explanation: String,
    pub key_symptoms: Vec<String>,
    pub concerning_findings: Vec<String>,
    pub recommended_actions: Vec<String>,
    pub urgency_level: UrgencyLevel,
    pub time_to_treatment: String,
    pub vitals: Option<VitalsSnapshot>,
    pub vitals_contribution: f64,
    pub critical_vitals: bool,
    pub ai_model_version: String,
    pub timestamp: DateTime<Utc>,
}

impl TriageResult {
    pub fn is_critical(&self) -> bool {
        self.urgency_level == UrgencyLevel::Critical || self.critical_vitals
    }
}
