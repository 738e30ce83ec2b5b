use super::types::{AssessmentPrompt, Demographics};
use crate::models::VitalsSnapshot;

/// Placeholder used for any section the caller did not supply.
pub const NOT_PROVIDED: &str = "not provided";

pub const TRIAGE_SYSTEM_PROMPT: &str = r#"
You are an emergency triage assistant. Your ONLY role is to estimate how urgently
a patient needs care from the symptoms they describe and any vital signs provided.

SEVERITY RUBRIC (0-10):
- 0-2: non_urgent. Self-care or a routine appointment is appropriate.
- 3-4: standard. See a clinician within a day or two.
- 5-6: urgent. Needs care within hours.
- 7-8: high_priority. Needs emergency evaluation promptly.
- 9-10: critical. Life-threatening, needs immediate emergency care.

RULES:
1. Be conservative: when in doubt, score higher.
2. Base the score on the described symptoms and the vital signs given. Do not
   invent readings that were not provided.
3. The confidence range is where you believe the true severity lies; it must
   satisfy 0 <= confidence_lower <= confidence_upper <= 10.
4. urgency_level must match the rubric tier of severity_score.
5. Output MUST be a single valid JSON object and nothing else.
"#;

/// Render the vitals section as `key: value` lines, or "not provided".
pub fn format_vitals(vitals: Option<&VitalsSnapshot>) -> String {
    let Some(snapshot) = vitals else {
        return NOT_PROVIDED.to_string();
    };
    let readings = snapshot.readings();
    if readings.is_empty() {
        return NOT_PROVIDED.to_string();
    }
    readings
        .into_iter()
        .map(|(kind, value)| format!("- {}: {} {}", kind.label(), value, kind.default_unit()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render demographics as `key: value` lines, or "not provided".
pub fn format_demographics(demographics: Option<&Demographics>) -> String {
    match demographics {
        Some(map) if !map.is_empty() => map
            .iter()
            .map(|(k, v)| format!("- {k}: {v}"))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => NOT_PROVIDED.to_string(),
    }
}

/// Build the assessment prompt. The symptom text is embedded verbatim.
pub fn build_assessment_prompt(
    symptoms: &str,
    vitals: Option<&VitalsSnapshot>,
    demographics: Option<&Demographics>,
) -> AssessmentPrompt {
    let vitals_section = format_vitals(vitals);
    let demographics_section = format_demographics(demographics);

    let user = format!(
        r#"<symptoms>
{symptoms}
</symptoms>

Vital signs:
{vitals_section}

Patient demographics:
{demographics_section}

Respond with exactly this JSON structure:

{{
  "severity_score": 0.0,
  "confidence_lower": 0.0,
  "confidence_upper": 0.0,
  "explanation": "why this score, in plain language",
  "key_symptoms": ["symptom"],
  "concerning_findings": ["finding"],
  "recommended_actions": ["action"],
  "urgency_level": "non_urgent | standard | urgent | high_priority | critical",
  "time_to_treatment": "e.g. immediately, within 1 hour, within 24 hours"
}}
"#
    );

    AssessmentPrompt {
        system: TRIAGE_SYSTEM_PROMPT.trim().to_string(),
        user,
    }
}
