//! Google Gemini `generateContent` client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use super::traits::{
    retry_after_ms, CompletionRequest, CompletionResponse, LLMProvider, ProviderError,
    ProviderResult,
};
use crate::runner::rate_limiter::RateLimiter;

const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini API client
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    http_client: Client,
    rate_limiter: Arc<RateLimiter>,
    default_model: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            http_client: Client::new(),
            rate_limiter: Arc::new(RateLimiter::new(15, 250_000)),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Create from environment variable
    pub fn from_env() -> ProviderResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| ProviderError::Config("GEMINI_API_KEY not set".to_string()))?;
        Ok(Self::new(api_key))
    }

    /// Set custom base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set custom rate limits
    pub fn with_rate_limits(mut self, rpm: u32, tpm: u32) -> Self {
        self.rate_limiter = Arc::new(RateLimiter::new(rpm, tpm));
        self
    }

    /// Set default model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

fn build_request(request: &CompletionRequest) -> GeminiRequest {
    let contents = request
        .messages
        .iter()
        .map(|msg| GeminiContent {
            // Gemini names the assistant role "model"
            role: Some(if msg.role == "assistant" { "model" } else { "user" }.to_string()),
            parts: vec![GeminiPart {
                text: msg.content.clone(),
            }],
        })
        .collect();

    GeminiRequest {
        contents,
        system_instruction: request.system_prompt.as_ref().map(|system| GeminiContent {
            role: None,
            parts: vec![GeminiPart {
                text: system.clone(),
            }],
        }),
        generation_config: GenerationConfig {
            max_output_tokens: request.max_tokens,
            temperature: request.temperature,
            response_mime_type: request.json_output.then_some("application/json"),
        },
    }
}

fn parse_response(
    api_response: GeminiResponse,
    fallback_model: &str,
    latency_ms: u64,
) -> ProviderResult<CompletionResponse> {
    let candidate = api_response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Parse("No candidates in response".to_string()))?;

    let content = candidate
        .content
        .map(|c| c.parts.into_iter().map(|p| p.text).collect::<Vec<_>>().join(""))
        .unwrap_or_default();
    let (input_tokens, output_tokens) = api_response
        .usage_metadata
        .map(|u| (u.prompt_token_count, u.candidates_token_count))
        .unwrap_or((0, 0));

    Ok(CompletionResponse {
        content,
        model: api_response
            .model_version
            .unwrap_or_else(|| fallback_model.to_string()),
        input_tokens,
        output_tokens,
        finish_reason: candidate
            .finish_reason
            .unwrap_or_else(|| "unknown".to_string()),
        latency_ms,
    })
}

#[async_trait]
impl LLMProvider for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<CompletionResponse> {
        let _guard = self.rate_limiter.acquire().await;
        self.rate_limiter
            .wait_for_token_capacity(request.max_tokens)
            .await;

        let start = Instant::now();
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let body = build_request(request);

        tracing::debug!("Gemini request to {} ({} messages)", model, request.messages.len());

        let response = self
            .http_client
            .post(format!("{}/models/{}:generateContent", self.base_url, model))
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let latency_ms = start.elapsed().as_millis() as u64;
        let status = response.status();

        if status == 429 {
            let retry_after = retry_after_ms(response.headers());
            let body = response.text().await.unwrap_or_default();
            tracing::debug!("Gemini rate limited: {}", body);
            return Err(ProviderError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let (message, api_status) = match serde_json::from_str::<GeminiError>(&body) {
                Ok(error) => (error.error.message, error.error.status),
                Err(_) => (format!("HTTP {}: {}", status.as_u16(), body), None),
            };

            if status == 401
                || status == 403
                || api_status.as_deref() == Some("PERMISSION_DENIED")
                || message.contains("API key not valid")
            {
                return Err(ProviderError::Config(format!(
                    "Gemini auth error ({}): {}",
                    status.as_u16(),
                    message
                )));
            }

            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let api_response: GeminiResponse = response.json().await?;
        let completion = parse_response(api_response, &model, latency_ms)?;

        self.rate_limiter
            .record_tokens(completion.input_tokens + completion.output_tokens)
            .await;

        Ok(completion)
    }

    fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }
}
