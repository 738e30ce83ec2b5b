//! Content-safety screen applied to every provider response.
//!
//! Providers that report per-category ratings are checked against the
//! configured thresholds here, independently of whether the provider itself
//! enforced them.

use serde::{Deserialize, Serialize};

use super::types::{RawResponse, SafetyConfig};
use crate::models::{HarmProbability, SafetyCategory};

/// Finish reason providers use when generation stopped on a safety filter.
const SAFETY_FINISH_REASON: &str = "SAFETY";

/// A response rejected by the safety screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyViolation {
    pub category: Option<SafetyCategory>,
    pub probability: Option<HarmProbability>,
}

impl std::fmt::Display for SafetyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.category, self.probability) {
            (Some(c), Some(p)) => write!(f, "{c} rated {p}"),
            (Some(c), None) => write!(f, "{c}"),
            _ => f.write_str("stopped by provider safety filter"),
        }
    }
}

/// Reject a response that any configured category flags at or above its
/// threshold, or that the provider stopped for safety reasons.
pub fn screen_response(raw: &RawResponse, config: &SafetyConfig) -> Result<(), SafetyViolation> {
    let worst = raw
        .safety_ratings
        .iter()
        .filter(|r| config.threshold_for(r.category).blocks(r.probability))
        .max_by_key(|r| r.probability);

    if let Some(rating) = worst {
        tracing::warn!(
            category = rating.category.as_str(),
            probability = rating.probability.as_str(),
            "Provider response blocked by safety screen"
        );
        return Err(SafetyViolation {
            category: Some(rating.category),
            probability: Some(rating.probability),
        });
    }

    if raw
        .finish_reason
        .as_deref()
        .is_some_and(|r| r.eq_ignore_ascii_case(SAFETY_FINISH_REASON))
    {
        tracing::warn!("Provider stopped generation on safety grounds");
        return Err(SafetyViolation {
            category: None,
            probability: None,
        });
    }

    Ok(())
}
