//! Judgment decoding, scoring and aggregation

pub mod judgment;
pub mod matching;
pub mod metrics;
pub mod scoring;

pub use judgment::{
    extract_json_value, parse_judgment, AtomicAnswer, Contradiction, DsqaJudgment,
    FactsJudgment, ImageRegion, Judgment, JudgmentError, MatchedFact, ReasoningStep,
};
pub use matching::{normalize, FactMatcher, MatchPolicy};
pub use metrics::{AggregateMetrics, CompositeWeights, EvaluationResult, RunningMetrics};
pub use scoring::{chain_completeness, f1, CaseStatus, ScoreSet, Scorer, ScoringPolicy};
