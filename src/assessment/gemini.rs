//! Hosted provider speaking the Gemini `generateContent` REST API.
//!
//! This API enforces safety thresholds server-side and reports per-category
//! ratings on every candidate, which feed the local safety screen.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::types::{AiProvider, AssessmentPrompt, ModelParams, RawResponse, SafetyConfig, SafetyRating};
use super::ProviderError;
use crate::models::{HarmProbability, HarmThreshold, SafetyCategory};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// HTTP client for the hosted generative model.
pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl GeminiProvider {
    pub fn new(base_url: &str, api_key: &str, timeout_secs: u64) -> Result<Self, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::Auth("API key is not configured".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ProviderError::Client(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
            timeout_secs,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }
}

fn category_wire_name(category: SafetyCategory) -> &'static str {
    match category {
        SafetyCategory::Harassment => "HARM_CATEGORY_HARASSMENT",
        SafetyCategory::HateSpeech => "HARM_CATEGORY_HATE_SPEECH",
        SafetyCategory::SexuallyExplicit => "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        SafetyCategory::DangerousContent => "HARM_CATEGORY_DANGEROUS_CONTENT",
    }
}

fn category_from_wire(name: &str) -> Option<SafetyCategory> {
    SafetyCategory::ALL
        .into_iter()
        .find(|c| category_wire_name(*c) == name)
}

fn threshold_wire_name(threshold: HarmThreshold) -> &'static str {
    match threshold {
        HarmThreshold::BlockLowAndAbove => "BLOCK_LOW_AND_ABOVE",
        HarmThreshold::BlockMediumAndAbove => "BLOCK_MEDIUM_AND_ABOVE",
        HarmThreshold::BlockOnlyHigh => "BLOCK_ONLY_HIGH",
        HarmThreshold::BlockNone => "BLOCK_NONE",
    }
}

fn probability_from_wire(name: &str) -> Option<HarmProbability> {
    match name {
        "NEGLIGIBLE" => Some(HarmProbability::Negligible),
        "LOW" => Some(HarmProbability::Low),
        "MEDIUM" => Some(HarmProbability::Medium),
        "HIGH" => Some(HarmProbability::High),
        _ => None,
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<WireContent<'a>>,
    system_instruction: WireContent<'a>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Serialize)]
struct WireContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<WirePart<'a>>,
}

#[derive(Serialize)]
struct WirePart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

fn build_request<'a>(
    prompt: &'a AssessmentPrompt,
    safety: &SafetyConfig,
    params: &ModelParams,
) -> GenerateContentRequest<'a> {
    GenerateContentRequest {
        contents: vec![WireContent {
            role: Some("user"),
            parts: vec![WirePart { text: &prompt.user }],
        }],
        system_instruction: WireContent {
            role: None,
            parts: vec![WirePart { text: &prompt.system }],
        },
        generation_config: GenerationConfig {
            temperature: params.temperature,
            top_k: params.top_k,
            top_p: params.top_p,
            max_output_tokens: params.max_output_tokens,
            response_mime_type: "application/json",
        },
        safety_settings: safety
            .thresholds
            .iter()
            .map(|(category, threshold)| SafetySetting {
                category: category_wire_name(*category),
                threshold: threshold_wire_name(*threshold),
            })
            .collect(),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
    #[serde(default)]
    safety_ratings: Vec<WireSafetyRating>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireSafetyRating {
    category: String,
    probability: String,
}

/// Convert the wire response into a `RawResponse`. Unknown categories and
/// probabilities are skipped.
fn into_raw_response(response: GenerateContentResponse) -> Result<RawResponse, ProviderError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(match reason.as_str() {
            "SAFETY" | "BLOCKLIST" => ProviderError::SafetyBlock(reason),
            _ => ProviderError::BadRequest {
                status: 200,
                body: format!("prompt blocked: {reason}"),
            },
        });
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Malformed("response has no candidates".into()))?;

    let text = candidate.content.map(|c| {
        c.parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("")
    });

    let safety_ratings = candidate
        .safety_ratings
        .iter()
        .filter_map(|r| {
            Some(SafetyRating {
                category: category_from_wire(&r.category)?,
                probability: probability_from_wire(&r.probability)?,
            })
        })
        .collect();

    Ok(RawResponse {
        text,
        safety_ratings,
        finish_reason: candidate.finish_reason,
    })
}

/// Map a non-success HTTP status to a provider error.
fn classify_status(status: u16, body: String) -> ProviderError {
    match status {
        401 | 403 => ProviderError::Auth(body),
        429 => ProviderError::Quota(body),
        500..=599 => ProviderError::Server { status, body },
        _ => ProviderError::BadRequest { status, body },
    }
}

#[async_trait]
impl AiProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(
        &self,
        prompt: &AssessmentPrompt,
        safety: &SafetyConfig,
        params: &ModelParams,
    ) -> Result<RawResponse, ProviderError> {
        let body = build_request(prompt, safety, params);

        let response = self
            .client
            .post(self.endpoint(&params.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.timeout_secs)
                } else if e.is_connect() {
                    ProviderError::Connection(self.base_url.clone())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), body));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        into_raw_response(parsed)
    }
}
