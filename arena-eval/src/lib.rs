//! ARENA: evaluation harness for reasoning and multimodal fact-checking
//!
//! This crate scores a candidate model's structured answers on two benchmark
//! modalities, DSQA (open-ended reasoning with a sourced step chain) and
//! FACTS (fact-checking against an image or context), and rolls per-case
//! scores into run-level metrics.
//!
//! # Features
//!
//! - Built-in DSQA and FACTS cases, or JSON dataset files
//! - Gemini and OpenAI-compatible subject and judge models
//! - Tolerant judge-output parsing with typed failure reasons
//! - Recall, precision, F1, contradiction and chain-completeness scoring
//! - Sequential, paced, cancellable runs streaming progress events
//! - JSON Lines result logs and JSON run summaries
//!
//! # Example
//!
//! ```no_run
//! use arena_eval::{
//!     cases::builtin_cases,
//!     config::Config,
//!     runner::{ConsoleProgress, Orchestrator},
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Subject and judge keys come from GEMINI_API_KEY
//!     let config = Config::load_or_default();
//!     let mut orchestrator = Orchestrator::from_config(&config, false)?
//!         .with_sink(Arc::new(ConsoleProgress));
//!
//!     let report = orchestrator
//!         .run(&builtin_cases(), &CancellationToken::new())
//!         .await?;
//!     println!("Composite score: {:.1}", report.metrics.composite_score);
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod cases;
pub mod config;
pub mod providers;
pub mod reporting;
pub mod runner;

pub use config::Config;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::analysis::{
        parse_judgment, AggregateMetrics, CaseStatus, CompositeWeights, EvaluationResult,
        Judgment, JudgmentError, MatchPolicy, RunningMetrics, ScoreSet, Scorer, ScoringPolicy,
    };
    pub use crate::cases::{builtin_cases, load_cases_from_file, BenchmarkCase, Modality};
    pub use crate::config::{Config, ModelSettings, ProviderKind};
    pub use crate::providers::{
        create_provider, CompletionRequest, CompletionResponse, LLMProvider, Message,
        ProviderError, ProviderResult,
    };
    pub use crate::reporting::{print_console_report, JsonSummary, ResultLog};
    pub use crate::runner::{
        EchoJudge, Judge, JudgeVerdict, Orchestrator, ProgressSink, RunError, RunEvent,
        RunHandle, RunReport, RunSettings, RunState, SubjectModel,
    };
}
