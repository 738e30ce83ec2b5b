use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assessment::gemini::DEFAULT_GEMINI_BASE_URL;
use crate::assessment::ollama::DEFAULT_OLLAMA_BASE_URL;
use crate::assessment::{
    AiProvider, AssessmentClient, GeminiProvider, ModelParams, OllamaProvider, ProviderError,
    RetryPolicy, SafetyConfig, DEFAULT_MODEL,
};
use crate::models::{HarmThreshold, ProviderKind};

/// Application-level constants
pub const APP_NAME: &str = "triage-engine";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const CONFIG_FILE_NAME: &str = "config.json";

/// Filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info,triage_engine=debug,reqwest=warn,hyper=warn"
}

/// Default config file location: `<config dir>/triage-engine/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME).join(CONFIG_FILE_NAME))
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Engine configuration. Every field has a default, so a config file only
/// needs the keys it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct TriageConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub api_key: Option<String>,
    /// Provider default when unset.
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub safety_threshold: HarmThreshold,
}

impl Default for TriageConfig {
    fn default() -> Self {
        let params = ModelParams::default();
        Self {
            provider: ProviderKind::Gemini,
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            base_url: None,
            timeout_secs: 10,
            max_retries: 3,
            initial_backoff_ms: 250,
            max_output_tokens: params.max_output_tokens,
            temperature: params.temperature,
            top_k: params.top_k,
            top_p: params.top_p,
            safety_threshold: HarmThreshold::BlockMediumAndAbove,
        }
    }
}

impl TriageConfig {
    /// Defaults, then the config file, then environment variables.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(default) => Self::from_file(&default)?,
                None => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Override fields from `TRIAGE_*` variables. `GEMINI_API_KEY` is used
    /// when `TRIAGE_API_KEY` is unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("TRIAGE_PROVIDER") {
            self.provider = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "TRIAGE_PROVIDER".into(),
                value,
            })?;
        }
        if let Some(value) = lookup("TRIAGE_MODEL") {
            self.model = value;
        }
        if let Some(value) = lookup("TRIAGE_API_KEY").or_else(|| lookup("GEMINI_API_KEY")) {
            self.api_key = Some(value);
        }
        if let Some(value) = lookup("TRIAGE_BASE_URL") {
            self.base_url = Some(value);
        }
        if let Some(value) = lookup("TRIAGE_TIMEOUT_SECS") {
            self.timeout_secs = parse_env("TRIAGE_TIMEOUT_SECS", value)?;
        }
        if let Some(value) = lookup("TRIAGE_MAX_RETRIES") {
            self.max_retries = parse_env("TRIAGE_MAX_RETRIES", value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model must not be empty".into()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeoutSecs must be positive".into()));
        }
        if self.max_output_tokens == 0 {
            return Err(ConfigError::Invalid("maxOutputTokens must be positive".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature {} outside 0-2",
                self.temperature
            )));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(ConfigError::Invalid(format!("topP {} outside (0, 1]", self.top_p)));
        }
        Ok(())
    }

    pub fn base_url(&self) -> &str {
        match (&self.base_url, self.provider) {
            (Some(url), _) => url,
            (None, ProviderKind::Gemini) => DEFAULT_GEMINI_BASE_URL,
            (None, ProviderKind::Ollama) => DEFAULT_OLLAMA_BASE_URL,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn model_params(&self) -> ModelParams {
        ModelParams {
            model: self.model.clone(),
            max_output_tokens: self.max_output_tokens,
            temperature: self.temperature,
            top_k: self.top_k,
            top_p: self.top_p,
        }
    }

    pub fn safety_config(&self) -> SafetyConfig {
        SafetyConfig::uniform(self.safety_threshold)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.initial_backoff_ms))
    }

    /// Concrete provider for `self.provider`.
    pub fn build_provider(&self) -> Result<Arc<dyn AiProvider>, ProviderError> {
        // The HTTP client gets a little headroom so the assessment timeout
        // fires first.
        let http_timeout = self.timeout_secs + 5;
        let provider: Arc<dyn AiProvider> = match self.provider {
            ProviderKind::Gemini => Arc::new(GeminiProvider::new(
                self.base_url(),
                self.api_key.as_deref().unwrap_or_default(),
                http_timeout,
            )?),
            ProviderKind::Ollama => Arc::new(OllamaProvider::new(self.base_url(), http_timeout)?),
        };
        tracing::info!(provider = provider.name(), model = %self.model, "AI provider configured");
        Ok(provider)
    }

    pub fn build_client(&self) -> Result<AssessmentClient, ProviderError> {
        Ok(AssessmentClient::new(self.build_provider()?, self.model_params())
            .with_safety(self.safety_config())
            .with_retry_policy(self.retry_policy())
            .with_timeout(self.timeout()))
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.into(),
        value,
    })
}
