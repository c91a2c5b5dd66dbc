//! Configuration management for arena evaluation runs
//!
//! Loads subject, judge, pacing and scoring settings from TOML files.
//! Credentials are never stored here; each model names the environment
//! variable holding its key.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::analysis::{CompositeWeights, ScoringPolicy};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Model producing candidate answers
    #[serde(default = "ModelSettings::default_subject")]
    pub subject: ModelSettings,
    /// Model grading candidate answers
    #[serde(default = "ModelSettings::default_judge")]
    pub judge: ModelSettings,
    #[serde(default)]
    pub benchmark: BenchmarkConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
}

/// Wire protocol of a model endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google `generateContent`
    Gemini,
    /// Any OpenAI-compatible `chat/completions` endpoint
    #[serde(alias = "openai_compatible", alias = "custom")]
    OpenAi,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAi => "openai",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            ProviderKind::OpenAi => "https://api.openai.com/v1",
        }
    }

    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "GEMINI_API_KEY",
            ProviderKind::OpenAi => "OPENAI_API_KEY",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "openai" | "openai_compatible" | "custom" => Ok(ProviderKind::OpenAi),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// Endpoint and model settings for the subject or the judge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub provider: ProviderKind,
    pub model: String,
    /// Overrides the provider's default endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Environment variable holding the API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Requests per minute
    #[serde(default = "default_rpm")]
    pub rpm: u32,
    /// Tokens per minute
    #[serde(default = "default_tpm")]
    pub tpm: u32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ModelSettings {
    pub fn new(provider: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            base_url: None,
            api_key_env: None,
            rpm: default_rpm(),
            tpm: default_tpm(),
            max_output_tokens: default_max_output_tokens(),
            temperature: None,
        }
    }

    fn default_subject() -> Self {
        Self::new(ProviderKind::Gemini, "gemini-2.5-flash")
    }

    fn default_judge() -> Self {
        Self {
            temperature: Some(0.0),
            ..Self::new(ProviderKind::Gemini, "gemini-3-pro-preview")
        }
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
    }

    pub fn api_key_env(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.provider.default_api_key_env())
    }

    /// Human-readable "provider/model" label
    pub fn label(&self) -> String {
        format!("{}/{}", self.provider, self.model)
    }
}

/// Run pacing and output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Pause after each case before starting the next
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    /// Upper bound on a single subject or judge call
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            pacing_ms: default_pacing_ms(),
            timeout_ms: default_timeout_ms(),
            output_dir: default_output_dir(),
        }
    }
}

/// Scoring and aggregation settings.
///
/// The policy keys sit directly under `[scoring]`; their defaults are the
/// scorer's own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(flatten)]
    pub policy: ScoringPolicy,
    #[serde(default)]
    pub weights: CompositeWeights,
}

impl ScoringConfig {
    pub fn policy(&self) -> ScoringPolicy {
        self.policy.clone()
    }
}

// Default value functions
fn default_rpm() -> u32 { 15 }
fn default_tpm() -> u32 { 250_000 }
fn default_max_output_tokens() -> u32 { 4096 }
fn default_pacing_ms() -> u64 { 2_000 }
fn default_timeout_ms() -> u64 { 120_000 }
fn default_output_dir() -> String { "results/runs".to_string() }

impl Default for Config {
    fn default() -> Self {
        Self {
            subject: ModelSettings::default_subject(),
            judge: ModelSettings::default_judge(),
            benchmark: BenchmarkConfig::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from default config location or return defaults
    pub fn load_or_default() -> Self {
        let config_paths = [
            "config/arena.toml",
            "../config/arena.toml",
            "arena-eval/config/arena.toml",
        ];

        for path in &config_paths {
            if !Path::new(path).exists() {
                continue;
            }
            match Self::from_file(path) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", path);
                    return config;
                }
                Err(e) => tracing::warn!("Ignoring {}: {}", path, e),
            }
        }

        tracing::info!("Using default configuration");
        Self::default()
    }

    /// Save configuration to a TOML file
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings no run could use
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (role, model) in [("subject", &self.subject), ("judge", &self.judge)] {
            if model.model.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} model is empty", role)));
            }
        }
        if self.benchmark.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeout_ms must be positive".into()));
        }
        let threshold = self.scoring.policy.failure_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Invalid(format!(
                "failure_threshold {} is outside [0, 1]",
                threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.scoring.policy.dsqa_confidence_weight) {
            return Err(ConfigError::Invalid(
                "dsqa_confidence_weight must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
