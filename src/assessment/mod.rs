pub mod types;
pub mod prompt;
pub mod parser;
pub mod safety;
pub mod retry;
pub mod client;
pub mod gemini;
pub mod ollama;
pub mod mock;

pub use types::*;
pub use prompt::*;
pub use parser::*;
pub use safety::*;
pub use retry::*;
pub use client::*;
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use mock::MockAiProvider;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by an AI provider for a single `generate` call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("AI provider is not reachable at {0}")]
    Connection(String),

    #[error("AI provider request timed out after {0}s")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("AI provider returned error (status {status}): {body}")]
    Server { status: u16, body: String },

    #[error("AI provider rejected the credentials: {0}")]
    Auth(String),

    #[error("AI provider quota exhausted: {0}")]
    Quota(String),

    #[error("AI provider rejected the request (status {status}): {body}")]
    BadRequest { status: u16, body: String },

    #[error("Request blocked by provider safety filter: {0}")]
    SafetyBlock(String),

    #[error("Malformed provider response: {0}")]
    Malformed(String),

    #[error("HTTP client error: {0}")]
    Client(String),
}

impl ProviderError {
    /// Errors worth another attempt with the same payload.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Connection(_)
                | ProviderError::Timeout(_)
                | ProviderError::Network(_)
                | ProviderError::Server { .. }
                | ProviderError::Malformed(_)
        )
    }
}

/// Machine-distinguishable failure kind surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Symptom text missing; nothing was sent to the provider.
    InvalidInput,
    /// Provider or local screen flagged the content; ask the patient to rephrase.
    SafetyBlocked,
    /// The model kept returning output that failed validation.
    InvalidResponse,
    /// Transport kept failing (timeouts, 5xx, unreachable).
    ProviderUnavailable,
    /// Non-transient provider refusal (credentials, quota, bad request).
    ProviderRejected,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::SafetyBlocked => "safety_blocked",
            ErrorKind::InvalidResponse => "invalid_response",
            ErrorKind::ProviderUnavailable => "provider_unavailable",
            ErrorKind::ProviderRejected => "provider_rejected",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecoverable failure of `AssessmentClient::assess`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssessmentError {
    #[error("Cannot assess: {0}")]
    InvalidInput(String),

    #[error("Cannot assess this description, please rephrase it ({0})")]
    SafetyBlocked(String),

    #[error("AI returned an invalid assessment after {attempts} attempt(s): {reason}")]
    InvalidResponse { attempts: u32, reason: String },

    #[error("AI provider unavailable after {attempts} attempt(s): {last_error}")]
    ProviderUnavailable { attempts: u32, last_error: ProviderError },

    #[error("AI provider refused the request: {0}")]
    ProviderRejected(ProviderError),
}

impl AssessmentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AssessmentError::InvalidInput(_) => ErrorKind::InvalidInput,
            AssessmentError::SafetyBlocked(_) => ErrorKind::SafetyBlocked,
            AssessmentError::InvalidResponse { .. } => ErrorKind::InvalidResponse,
            AssessmentError::ProviderUnavailable { .. } => ErrorKind::ProviderUnavailable,
            AssessmentError::ProviderRejected(_) => ErrorKind::ProviderRejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_provider_errors() {
        assert!(ProviderError::Timeout(10).is_transient());
        assert!(ProviderError::Server { status: 503, body: String::new() }.is_transient());
        assert!(ProviderError::Connection("localhost".into()).is_transient());
        assert!(ProviderError::Malformed("truncated".into()).is_transient());
    }

    #[test]
    fn non_transient_provider_errors() {
        assert!(!ProviderError::Auth("bad key".into()).is_transient());
        assert!(!ProviderError::Quota("daily".into()).is_transient());
        assert!(!ProviderError::SafetyBlock("SAFETY".into()).is_transient());
        assert!(!ProviderError::BadRequest { status: 400, body: String::new() }.is_transient());
    }

    #[test]
    fn error_kinds_are_distinct() {
        let invalid = AssessmentError::InvalidResponse { attempts: 4, reason: "x".into() };
        let transport = AssessmentError::ProviderUnavailable {
            attempts: 4,
            last_error: ProviderError::Timeout(10),
        };
        assert_eq!(invalid.kind(), ErrorKind::InvalidResponse);
        assert_eq!(transport.kind(), ErrorKind::ProviderUnavailable);
        assert_ne!(invalid.kind(), transport.kind());
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::SafetyBlocked).unwrap();
        assert_eq!(json, "\"safety_blocked\"");
        assert_eq!(ErrorKind::ProviderRejected.to_string(), "provider_rejected");
    }

    #[test]
    fn safety_message_asks_to_rephrase() {
        let err = AssessmentError::SafetyBlocked("dangerous_content rated high".into());
        assert!(err.to_string().contains("rephrase"));
    }
}
