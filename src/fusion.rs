//! Fusion of the AI verdict with the vitals boost into the final result.
//!
//! Pure and infallible. The post-boost score is authoritative: the urgency
//! tier the model reported is discarded and re-derived from the final score,
//! which is rounded half-up to a whole number first.

use chrono::Utc;
use uuid::Uuid;

use crate::models::{TriageResult, TriageVerdict, UrgencyLevel, VitalsSnapshot};
use crate::vitals_risk::{has_critical_vitals, vitals_severity_boost};

const MIN_SCORE: f64 = 0.0;
const MAX_SCORE: f64 = 10.0;

pub struct FusionEngine {
    model_version: String,
}

impl FusionEngine {
    pub fn new(model_version: impl Into<String>) -> Self {
        Self {
            model_version: model_version.into(),
        }
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    pub fn fuse(&self, verdict: TriageVerdict, vitals: Option<VitalsSnapshot>) -> TriageResult {
        let contribution = vitals.as_ref().map(vitals_severity_boost).unwrap_or(0.0);
        let critical_vitals = vitals.as_ref().is_some_and(has_critical_vitals);

        let severity_score = final_score(verdict.severity_score + contribution);
        let lower = final_score(verdict.confidence_lower + contribution);
        let upper = final_score(verdict.confidence_upper + contribution);
        let urgency_level = UrgencyLevel::from_score(severity_score);

        if urgency_level != verdict.urgency_level {
            tracing::debug!(
                reported = %verdict.urgency_level,
                derived = %urgency_level,
                contribution,
                "Urgency tier re-derived from fused score"
            );
        }

        TriageResult {
            assessment_id: Uuid::new_v4(),
            severity_score,
            ai_severity_score: verdict.severity_score,
            confidence_lower: lower.min(upper),
            confidence_upper: upper,
            explanation: verdict.explanation,
            key_symptoms: verdict.key_symptoms,
            concerning_findings: verdict.concerning_findings,
            recommended_actions: verdict.recommended_actions,
            urgency_level,
            time_to_treatment: verdict.time_to_treatment,
            vitals,
            vitals_contribution: contribution,
            critical_vitals,
            ai_model_version: self.model_version.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Clamp to 0-10, then round half-up. Scores are non-negative here, so
/// `round` (half away from zero) rounds 6.5 up to 7.
fn final_score(value: f64) -> f64 {
    value.clamp(MIN_SCORE, MAX_SCORE).round()
}
