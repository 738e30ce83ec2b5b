use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::Instrument;

use super::parser::{parse_verdict, VerdictError};
use super::prompt::build_assessment_prompt;
use super::retry::{RetryFailure, RetryPolicy, Retryable};
use super::safety::{screen_response, SafetyViolation};
use super::types::{AiProvider, AssessmentPrompt, Demographics, ModelParams, SafetyConfig};
use super::{AssessmentError, ProviderError};
use crate::models::{TriageVerdict, VitalsSnapshot};

/// Default per-call timeout at the provider boundary.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Failure of a single attempt, before retry classification.
#[derive(Error, Debug)]
enum AttemptError {
    #[error("{0}")]
    Provider(ProviderError),

    #[error("Provider call exceeded {0:?}")]
    Timeout(Duration),

    #[error("Blocked by safety screen: {0}")]
    Safety(SafetyViolation),

    #[error("{0}")]
    Verdict(VerdictError),
}

impl Retryable for AttemptError {
    fn is_transient(&self) -> bool {
        match self {
            AttemptError::Provider(e) => e.is_transient(),
            AttemptError::Timeout(_) => true,
            AttemptError::Safety(_) => false,
            AttemptError::Verdict(_) => true,
        }
    }
}

impl From<RetryFailure<AttemptError>> for AssessmentError {
    fn from(failure: RetryFailure<AttemptError>) -> Self {
        let attempts = failure.attempts;
        match failure.error {
            AttemptError::Safety(violation) => AssessmentError::SafetyBlocked(violation.to_string()),
            AttemptError::Provider(ProviderError::SafetyBlock(reason)) => {
                AssessmentError::SafetyBlocked(reason)
            }
            AttemptError::Provider(e) if e.is_transient() => AssessmentError::ProviderUnavailable {
                attempts,
                last_error: e,
            },
            AttemptError::Provider(e) => AssessmentError::ProviderRejected(e),
            AttemptError::Timeout(limit) => AssessmentError::ProviderUnavailable {
                attempts,
                last_error: ProviderError::Timeout(limit.as_secs()),
            },
            AttemptError::Verdict(e) => AssessmentError::InvalidResponse {
                attempts,
                reason: e.to_string(),
            },
        }
    }
}

/// Turns symptom text into a validated `TriageVerdict` via an AI provider.
///
/// One instance is built at composition time and shared; it holds no
/// per-request state.
pub struct AssessmentClient {
    provider: Arc<dyn AiProvider>,
    params: ModelParams,
    safety: SafetyConfig,
    retry: RetryPolicy,
    timeout: Duration,
}

impl AssessmentClient {
    pub fn new(provider: Arc<dyn AiProvider>, params: ModelParams) -> Self {
        Self {
            provider,
            params,
            safety: SafetyConfig::default(),
            retry: RetryPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_safety(mut self, safety: SafetyConfig) -> Self {
        self.safety = safety;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Model identifier recorded on every result.
    pub fn model_version(&self) -> &str {
        &self.params.model
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Assess a symptom description. Returns only fully validated verdicts.
    pub async fn assess(
        &self,
        symptoms: &str,
        vitals: Option<&VitalsSnapshot>,
        demographics: Option<&Demographics>,
    ) -> Result<TriageVerdict, AssessmentError> {
        if symptoms.trim().is_empty() {
            return Err(AssessmentError::InvalidInput(
                "symptom description is empty".into(),
            ));
        }

        let prompt = build_assessment_prompt(symptoms, vitals, demographics);
        tracing::debug!(
            provider = self.provider.name(),
            model = %self.params.model,
            symptom_chars = symptoms.chars().count(),
            has_vitals = vitals.is_some(),
            has_demographics = demographics.is_some(),
            "Requesting triage assessment"
        );

        let prompt = &prompt;
        let result = self
            .retry
            .run(move |attempt| {
                self.attempt(prompt, attempt)
                    .instrument(tracing::debug_span!("provider_attempt", attempt))
            })
            .await;

        match result {
            Ok(verdict) => {
                tracing::info!(
                    severity = verdict.severity_score,
                    urgency = verdict.urgency_level.as_str(),
                    "Assessment verdict accepted"
                );
                Ok(verdict)
            }
            Err(failure) => {
                let error = AssessmentError::from(failure);
                tracing::error!(kind = %error.kind(), error = %error, "Assessment failed");
                Err(error)
            }
        }
    }

    async fn attempt(&self, prompt: &AssessmentPrompt, attempt: u32) -> Result<TriageVerdict, AttemptError> {
        let call = self.provider.generate(prompt, &self.safety, &self.params);
        let raw = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return Err(AttemptError::Provider(e)),
            Err(_) => return Err(AttemptError::Timeout(self.timeout)),
        };

        screen_response(&raw, &self.safety).map_err(AttemptError::Safety)?;

        let text = raw
            .text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AttemptError::Verdict(VerdictError::Malformed("empty response".into())))?;

        let verdict = parse_verdict(text).map_err(AttemptError::Verdict)?;
        tracing::debug!(attempt, "Provider response validated");
        Ok(verdict)
    }
}
