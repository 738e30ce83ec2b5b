use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ProviderError;
use crate::models::{HarmProbability, HarmThreshold, SafetyCategory};

/// Patient demographics as ordered key/value pairs (age, sex, ...).
pub type Demographics = BTreeMap<String, String>;

/// Default model identifier for the hosted provider.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// The two halves of an assessment request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssessmentPrompt {
    pub system: String,
    pub user: String,
}

/// Generation parameters sent with every request.
///
/// Temperature is kept low so repeated assessments of the same description
/// score consistently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub model: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_output_tokens: 500,
            temperature: 0.3,
            top_k: 40,
            top_p: 0.9,
        }
    }
}

/// Per-category blocking thresholds for content safety.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyConfig {
    pub thresholds: BTreeMap<SafetyCategory, HarmThreshold>,
}

impl SafetyConfig {
    /// Same threshold for every category.
    pub fn uniform(threshold: HarmThreshold) -> Self {
        Self {
            thresholds: SafetyCategory::ALL
                .iter()
                .map(|c| (*c, threshold))
                .collect(),
        }
    }

    pub fn with_threshold(mut self, category: SafetyCategory, threshold: HarmThreshold) -> Self {
        self.thresholds.insert(category, threshold);
        self
    }

    /// Threshold for a category; unconfigured categories are not screened.
    pub fn threshold_for(&self, category: SafetyCategory) -> HarmThreshold {
        self.thresholds
            .get(&category)
            .copied()
            .unwrap_or(HarmThreshold::BlockNone)
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self::uniform(HarmThreshold::BlockMediumAndAbove)
    }
}

/// A provider's safety judgement for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyRating {
    pub category: SafetyCategory,
    pub probability: HarmProbability,
}

/// Unvalidated provider output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResponse {
    pub text: Option<String>,
    pub safety_ratings: Vec<SafetyRating>,
    pub finish_reason: Option<String>,
}

impl RawResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn with_rating(mut self, category: SafetyCategory, probability: HarmProbability) -> Self {
        self.safety_ratings.push(SafetyRating { category, probability });
        self
    }

    pub fn with_finish_reason(mut self, reason: impl Into<String>) -> Self {
        self.finish_reason = Some(reason.into());
        self
    }
}

/// AI provider abstraction (allows mocking).
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn generate(
        &self,
        prompt: &AssessmentPrompt,
        safety: &SafetyConfig,
        params: &ModelParams,
    ) -> Result<RawResponse, ProviderError>;
}
