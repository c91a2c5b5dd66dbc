//! Subject and judge seams over model providers

use async_trait::async_trait;
use std::sync::Arc;

use crate::analysis::extract_json_value;
use crate::cases::prompts::render_judge_prompt;
use crate::cases::BenchmarkCase;
use crate::config::ModelSettings;
use crate::providers::{CompletionRequest, LLMProvider, Message, ProviderResult};

/// Candidate output substituted when the subject call fails
pub const SUBJECT_FAILURE_SENTINEL: &str = r#"{"error": "Connection Failed"}"#;

const JUDGE_SYSTEM_PROMPT: &str =
    "You grade benchmark answers against ground truth and reply with a single JSON object.";

/// The model under evaluation
#[async_trait]
pub trait SubjectModel: Send + Sync {
    fn name(&self) -> &str;

    /// Produce the raw candidate output for a case
    async fn respond(&self, case: &BenchmarkCase) -> ProviderResult<String>;
}

/// Raw judge output for one case
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeVerdict {
    /// Text expected to hold the judgment object
    pub raw: String,
    pub rationale: String,
}

/// The model grading candidate output
#[async_trait]
pub trait Judge: Send + Sync {
    fn name(&self) -> &str;

    async fn judge(&self, case: &BenchmarkCase, candidate_output: &str)
        -> ProviderResult<JudgeVerdict>;
}

/// Subject backed by a provider, prompted with the case's modality template
pub struct LlmSubject {
    provider: Arc<dyn LLMProvider>,
    label: String,
    max_tokens: u32,
    temperature: Option<f32>,
}

impl LlmSubject {
    pub fn new(provider: Arc<dyn LLMProvider>, settings: &ModelSettings) -> Self {
        Self {
            provider,
            label: settings.label(),
            max_tokens: settings.max_output_tokens,
            temperature: settings.temperature,
        }
    }
}

#[async_trait]
impl SubjectModel for LlmSubject {
    fn name(&self) -> &str {
        &self.label
    }

    async fn respond(&self, case: &BenchmarkCase) -> ProviderResult<String> {
        let prompt = case.template().render(case);
        let request = CompletionRequest::new(vec![Message::user(prompt)], self.max_tokens)
            .with_temperature(self.temperature)
            .with_json_output();
        let response = self.provider.complete(&request).await?;
        tracing::debug!(
            "Subject answered {} in {}ms ({} tokens)",
            case.id(),
            response.latency_ms,
            response.output_tokens
        );
        Ok(response.content)
    }
}

/// Judge backed by a provider
pub struct LlmJudge {
    provider: Arc<dyn LLMProvider>,
    label: String,
    max_tokens: u32,
    temperature: Option<f32>,
}

impl LlmJudge {
    pub fn new(provider: Arc<dyn LLMProvider>, settings: &ModelSettings) -> Self {
        Self {
            provider,
            label: settings.label(),
            max_tokens: settings.max_output_tokens,
            temperature: settings.temperature,
        }
    }
}

#[async_trait]
impl Judge for LlmJudge {
    fn name(&self) -> &str {
        &self.label
    }

    async fn judge(
        &self,
        case: &BenchmarkCase,
        candidate_output: &str,
    ) -> ProviderResult<JudgeVerdict> {
        let prompt = render_judge_prompt(case, candidate_output);
        let request = CompletionRequest::new(vec![Message::user(prompt)], self.max_tokens)
            .with_system(JUDGE_SYSTEM_PROMPT)
            .with_temperature(self.temperature)
            .with_json_output();
        let response = self.provider.complete(&request).await?;
        let rationale = rationale_of(&response.content);
        Ok(JudgeVerdict {
            raw: response.content,
            rationale,
        })
    }
}

/// Scores the candidate's own structured output without a second model
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoJudge;

#[async_trait]
impl Judge for EchoJudge {
    fn name(&self) -> &str {
        "self-reported"
    }

    async fn judge(
        &self,
        _case: &BenchmarkCase,
        candidate_output: &str,
    ) -> ProviderResult<JudgeVerdict> {
        let rationale = match rationale_of(candidate_output) {
            r if r.is_empty() => "Scored from the candidate's self-reported output".to_string(),
            r => r,
        };
        Ok(JudgeVerdict {
            raw: candidate_output.to_string(),
            rationale,
        })
    }
}

/// The `rationale` string of the first JSON object in `raw`, or empty
fn rationale_of(raw: &str) -> String {
    extract_json_value(raw)
        .and_then(|v| v.get("rationale").and_then(|r| r.as_str()).map(str::to_string))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CompletionResponse, ProviderError};
    use crate::runner::RateLimiter;
    use std::sync::Mutex;

    /// Provider returning a canned reply and recording the last request
    struct CannedProvider {
        reply: String,
        seen: Mutex<Option<CompletionRequest>>,
        limiter: Arc<RateLimiter>,
    }

    impl CannedProvider {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                seen: Mutex::new(None),
                limiter: Arc::new(RateLimiter::new(100, 100_000)),
            })
        }
    }

    #[async_trait]
    impl LLMProvider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        fn default_model(&self) -> &str {
            "canned-1"
        }

        async fn complete(&self, request: &CompletionRequest) -> ProviderResult<CompletionResponse> {
            *self.seen.lock().unwrap() = Some(request.clone());
            if self.reply == "!fail" {
                return Err(ProviderError::Api {
                    status: 500,
                    message: "boom".into(),
                });
            }
            Ok(CompletionResponse {
                content: self.reply.clone(),
                model: "canned-1".into(),
                input_tokens: 1,
                output_tokens: 1,
                finish_reason: "stop".into(),
                latency_ms: 0,
            })
        }

        fn rate_limiter(&self) -> &Arc<RateLimiter> {
            &self.limiter
        }
    }

    fn settings() -> ModelSettings {
        ModelSettings::new(crate::config::ProviderKind::Gemini, "canned-1")
    }

    #[tokio::test]
    async fn test_subject_renders_template() {
        let provider = CannedProvider::new("{}");
        let subject = LlmSubject::new(provider.clone(), &settings());
        let case = BenchmarkCase::dsqa("D-1", "x", "Why?", ["a"]);

        assert_eq!(subject.respond(&case).await.unwrap(), "{}");
        let request = provider.seen.lock().unwrap().clone().unwrap();
        assert!(request.messages[0].content.contains("Question: Why?"));
        assert!(request.json_output);
        assert_eq!(subject.name(), "gemini/canned-1");
    }

    #[tokio::test]
    async fn test_judge_extracts_rationale() {
        let provider = CannedProvider::new(
            "```json\n{\"case_id\": \"D-1\", \"answers\": [], \"chain_of_thought_steps\": [], \"rationale\": \"Missed B\"}\n```",
        );
        let judge = LlmJudge::new(provider.clone(), &settings());
        let case = BenchmarkCase::dsqa("D-1", "x", "Why?", ["a"]);

        let verdict = judge.judge(&case, "candidate text").await.unwrap();
        assert_eq!(verdict.rationale, "Missed B");
        let request = provider.seen.lock().unwrap().clone().unwrap();
        assert!(request.messages[0].content.contains("candidate text"));
        assert!(request.system_prompt.is_some());
    }

    #[tokio::test]
    async fn test_judge_propagates_transport_error() {
        let judge = LlmJudge::new(CannedProvider::new("!fail"), &settings());
        let case = BenchmarkCase::dsqa("D-1", "x", "q", ["a"]);
        assert!(judge.judge(&case, "c").await.is_err());
    }

    #[tokio::test]
    async fn test_echo_judge_passes_candidate_through() {
        let case = BenchmarkCase::dsqa("D-1", "x", "q", ["a"]);
        let verdict = EchoJudge.judge(&case, "not json").await.unwrap();
        assert_eq!(verdict.raw, "not json");
        assert!(!verdict.rationale.is_empty());
    }
}
