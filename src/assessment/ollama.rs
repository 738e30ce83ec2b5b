use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::types::{AiProvider, AssessmentPrompt, ModelParams, RawResponse, SafetyConfig};
use super::ProviderError;

pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Ollama HTTP client for local inference.
///
/// Ollama reports no safety ratings, so the local screen only sees the
/// parsed verdict.
pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl OllamaProvider {
    /// Only loopback endpoints are accepted: symptom text must not leave the
    /// machine through this provider.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ProviderError> {
        validate_local_url(base_url)?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ProviderError::Client(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        })
    }

    /// Default Ollama instance at localhost:11434.
    pub fn default_local(timeout_secs: u64) -> Result<Self, ProviderError> {
        Self::new(DEFAULT_OLLAMA_BASE_URL, timeout_secs)
    }
}

/// Accept http(s) URLs whose host is localhost, 127.0.0.1 or [::1].
pub fn validate_local_url(url: &str) -> Result<(), ProviderError> {
    let after_scheme = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .ok_or_else(|| ProviderError::Client(format!("invalid endpoint URL: {url}")))?;

    let host = if after_scheme.starts_with('[') {
        after_scheme
            .split(']')
            .next()
            .unwrap_or("")
            .trim_start_matches('[')
    } else {
        after_scheme
            .split(['/', ':'])
            .next()
            .unwrap_or("")
    };

    match host {
        "localhost" | "127.0.0.1" | "::1" => Ok(()),
        _ => Err(ProviderError::Client(format!(
            "non-local endpoint rejected: {url}"
        ))),
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    format: &'static str,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    num_predict: u32,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
    done_reason: Option<String>,
}

fn build_request<'a>(prompt: &'a AssessmentPrompt, params: &'a ModelParams) -> OllamaGenerateRequest<'a> {
    OllamaGenerateRequest {
        model: &params.model,
        prompt: &prompt.user,
        system: &prompt.system,
        stream: false,
        format: "json",
        options: OllamaOptions {
            temperature: params.temperature,
            top_k: params.top_k,
            top_p: params.top_p,
            num_predict: params.max_output_tokens,
        },
    }
}

#[async_trait]
impl AiProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(
        &self,
        prompt: &AssessmentPrompt,
        _safety: &SafetyConfig,
        params: &ModelParams,
    ) -> Result<RawResponse, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = build_request(prompt, params);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ProviderError::Connection(self.base_url.clone())
                } else if e.is_timeout() {
                    ProviderError::Timeout(self.timeout_secs)
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let status = status.as_u16();
            return Err(if status >= 500 {
                ProviderError::Server { status, body }
            } else {
                ProviderError::BadRequest { status, body }
            });
        }

        let parsed: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        Ok(RawResponse {
            text: Some(parsed.response),
            safety_ratings: Vec::new(),
            finish_reason: parsed.done_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ollama_provider_trims_trailing_slash() {
        let provider = OllamaProvider::new("http://localhost:11434/", 10).unwrap();
        assert_eq!(provider.base_url, "http://localhost:11434");
    }

    #[test]
    fn default_local_uses_standard_port() {
        let provider = OllamaProvider::default_local(10).unwrap();
        assert_eq!(provider.base_url, "http://localhost:11434");
        assert_eq!(provider.name(), "ollama");
    }

    #[test]
    fn local_urls_accepted() {
        assert!(validate_local_url("http://localhost:11434").is_ok());
        assert!(validate_local_url("http://127.0.0.1:11434/").is_ok());
        assert!(validate_local_url("https://[::1]:11434").is_ok());
        assert!(validate_local_url("http://localhost/api").is_ok());
    }

    #[test]
    fn remote_urls_rejected() {
        assert!(validate_local_url("http://example.com:11434").is_err());
        assert!(validate_local_url("http://localhost.evil.com").is_err());
        assert!(validate_local_url("ftp://localhost").is_err());
        assert!(validate_local_url("localhost:11434").is_err());
        assert!(OllamaProvider::new("http://10.0.0.5:11434", 10).is_err());
    }

    #[test]
    fn request_maps_model_params() {
        let prompt = AssessmentPrompt {
            system: "rubric".into(),
            user: "symptoms".into(),
        };
        let params = ModelParams {
            model: "medgemma:4b".into(),
            ..ModelParams::default()
        };
        let json = serde_json::to_value(build_request(&prompt, &params)).unwrap();
        assert_eq!(json["model"], "medgemma:4b");
        assert_eq!(json["system"], "rubric");
        assert_eq!(json["prompt"], "symptoms");
        assert_eq!(json["stream"], false);
        assert_eq!(json["format"], "json");
        assert_eq!(json["options"]["num_predict"], 500);
        assert_eq!(json["options"]["top_k"], 40);
    }
}
