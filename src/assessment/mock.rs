use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::types::{AiProvider, AssessmentPrompt, ModelParams, RawResponse, SafetyConfig};
use super::ProviderError;

/// Mock AI provider for testing. Replays a script, then a fallback.
pub struct MockAiProvider {
    script: Mutex<VecDeque<Result<RawResponse, ProviderError>>>,
    fallback: Result<RawResponse, ProviderError>,
    delay: Option<Duration>,
    calls: AtomicU32,
    prompts: Mutex<Vec<AssessmentPrompt>>,
}

impl MockAiProvider {
    /// Always answers with `text`.
    pub fn new(text: &str) -> Self {
        Self::with_fallback(Ok(RawResponse::from_text(text)))
    }

    /// Always fails with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self::with_fallback(Err(error))
    }

    /// Replays `script` in order; once exhausted, repeats the last entry.
    pub fn scripted(script: Vec<Result<RawResponse, ProviderError>>) -> Self {
        let fallback = script
            .last()
            .cloned()
            .unwrap_or_else(|| Err(ProviderError::Malformed("empty script".into())));
        let mut mock = Self::with_fallback(fallback);
        mock.script = Mutex::new(script.into());
        mock
    }

    fn with_fallback(fallback: Result<RawResponse, ProviderError>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: None,
            calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<AssessmentPrompt> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn last_prompt(&self) -> Option<AssessmentPrompt> {
        self.prompts().pop()
    }
}

#[async_trait]
impl AiProvider for MockAiProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(
        &self,
        prompt: &AssessmentPrompt,
        _safety: &SafetyConfig,
        _params: &ModelParams,
    ) -> Result<RawResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.clone());
        }
        let next = self
            .script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| self.fallback.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> AssessmentPrompt {
        AssessmentPrompt {
            system: "system".into(),
            user: "user".into(),
        }
    }

    #[tokio::test]
    async fn mock_returns_configured_response() {
        let mock = MockAiProvider::new("test response");
        let raw = mock
            .generate(&prompt(), &SafetyConfig::default(), &ModelParams::default())
            .await
            .unwrap();
        assert_eq!(raw.text.as_deref(), Some("test response"));
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn scripted_mock_repeats_last_entry() {
        let mock = MockAiProvider::scripted(vec![
            Err(ProviderError::Timeout(1)),
            Ok(RawResponse::from_text("ok")),
        ]);
        let safety = SafetyConfig::default();
        let params = ModelParams::default();
        assert!(mock.generate(&prompt(), &safety, &params).await.is_err());
        assert!(mock.generate(&prompt(), &safety, &params).await.is_ok());
        assert!(mock.generate(&prompt(), &safety, &params).await.is_ok());
        assert_eq!(mock.calls(), 3);
        assert_eq!(mock.prompts().len(), 3);
    }
}
