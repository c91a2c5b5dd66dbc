//! Model provider implementations

pub mod gemini;
pub mod openai;
pub mod traits;

pub use gemini::GeminiClient;
pub use openai::OpenAIClient;
pub use traits::{
    CompletionRequest, CompletionResponse, LLMProvider, Message, ProviderError, ProviderResult,
};

use crate::config::{ModelSettings, ProviderKind};
use std::sync::Arc;

/// Read an API key from the environment; unset or blank is a configuration error
pub fn api_key_from_env(var: &str) -> ProviderResult<String> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(ProviderError::Config(format!("{} not set", var))),
    }
}

/// Create the client described by `settings`, reading its key from the environment
pub fn create_provider(settings: &ModelSettings) -> ProviderResult<Arc<dyn LLMProvider>> {
    let api_key = api_key_from_env(settings.api_key_env())?;
    Ok(create_provider_with_key(settings, api_key))
}

/// Create the client described by `settings` with an explicit key
pub fn create_provider_with_key(
    settings: &ModelSettings,
    api_key: String,
) -> Arc<dyn LLMProvider> {
    tracing::debug!("Creating {} provider at {}", settings.label(), settings.base_url());
    match settings.provider {
        ProviderKind::Gemini => Arc::new(
            GeminiClient::new(api_key)
                .with_base_url(settings.base_url())
                .with_rate_limits(settings.rpm, settings.tpm)
                .with_model(&settings.model),
        ),
        ProviderKind::OpenAi => Arc::new(
            OpenAIClient::new(api_key)
                .with_base_url(settings.base_url())
                .with_rate_limits(settings.rpm, settings.tpm)
                .with_model(&settings.model),
        ),
    }
}
