use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::models::{TriageVerdict, UrgencyLevel};

/// Why a provider response could not become a `TriageVerdict`.
/// Both variants are worth a fresh attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerdictError {
    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Response failed validation: {0}")]
    Invalid(String),
}

/// Locate the JSON object in a model response.
///
/// Accepts a bare object, a ```json fenced block, or an object surrounded by
/// prose.
fn extract_json_object(response: &str) -> Result<&str, VerdictError> {
    let body = match response.find("```json") {
        Some(fence) => {
            let start = fence + 7;
            let end = response[start..]
                .find("```")
                .ok_or_else(|| VerdictError::Malformed("Unclosed JSON block".into()))?;
            &response[start..start + end]
        }
        None => response,
    };

    let open = body
        .find('{')
        .ok_or_else(|| VerdictError::Malformed("No JSON object found".into()))?;
    let close = body
        .rfind('}')
        .filter(|&c| c > open)
        .ok_or_else(|| VerdictError::Malformed("Unterminated JSON object".into()))?;
    Ok(&body[open..=close])
}

#[derive(Deserialize)]
struct RawVerdict {
    #[serde(alias = "severityScore")]
    severity_score: Option<Value>,
    #[serde(alias = "confidenceLower")]
    confidence_lower: Option<Value>,
    #[serde(alias = "confidenceUpper")]
    confidence_upper: Option<Value>,
    explanation: Option<String>,
    #[serde(alias = "keySymptoms")]
    key_symptoms: Option<Vec<String>>,
    #[serde(alias = "concerningFindings")]
    concerning_findings: Option<Vec<String>>,
    #[serde(alias = "recommendedActions")]
    recommended_actions: Option<Vec<String>>,
    #[serde(alias = "urgencyLevel")]
    urgency_level: Option<String>,
    #[serde(alias = "timeToTreatment")]
    time_to_treatment: Option<String>,
}

fn required<T>(field: &str, value: Option<T>) -> Result<T, VerdictError> {
    value.ok_or_else(|| VerdictError::Invalid(format!("missing field '{field}'")))
}

/// A present, numeric field within [0, 10].
fn score_field(field: &str, value: Option<Value>) -> Result<f64, VerdictError> {
    let n = required(field, value)?
        .as_f64()
        .ok_or_else(|| VerdictError::Invalid(format!("'{field}' must be numeric")))?;
    if !n.is_finite() || !(0.0..=10.0).contains(&n) {
        return Err(VerdictError::Invalid(format!("'{field}' = {n} outside [0, 10]")));
    }
    Ok(n)
}

/// Parse and validate a model response. Returns a verdict only when every
/// check passes.
pub fn parse_verdict(response: &str) -> Result<TriageVerdict, VerdictError> {
    let json = extract_json_object(response)?;
    let raw: RawVerdict =
        serde_json::from_str(json).map_err(|e| VerdictError::Malformed(e.to_string()))?;

    let severity_score = score_field("severity_score", raw.severity_score)?;
    let confidence_lower = score_field("confidence_lower", raw.confidence_lower)?;
    let confidence_upper = score_field("confidence_upper", raw.confidence_upper)?;
    if confidence_lower > confidence_upper {
        return Err(VerdictError::Invalid(format!(
            "confidence_lower {confidence_lower} exceeds confidence_upper {confidence_upper}"
        )));
    }

    let urgency_raw = required("urgency_level", raw.urgency_level)?;
    let urgency_level = UrgencyLevel::parse_lenient(&urgency_raw)
        .map_err(|e| VerdictError::Invalid(e.to_string()))?;

    let explanation = required("explanation", raw.explanation)?;
    let time_to_treatment = required("time_to_treatment", raw.time_to_treatment)?;

    Ok(TriageVerdict {
        severity_score,
        confidence_lower,
        confidence_upper,
        explanation,
        key_symptoms: required("key_symptoms", raw.key_symptoms)?,
        concerning_findings: required("concerning_findings", raw.concerning_findings)?,
        recommended_actions: required("recommended_actions", raw.recommended_actions)?,
        urgency_level,
        time_to_treatment,
    })
}
