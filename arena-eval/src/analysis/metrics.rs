//! Evaluation results and run-level aggregate metrics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::judgment::Judgment;
use super::scoring::{CaseStatus, ScoreSet};
use crate::cases::{BenchmarkCase, Modality};

/// The scored outcome of one case. Fields are read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    case_id: String,
    modality: Modality,
    candidate_output: String,
    judgment: Option<Judgment>,
    scores: ScoreSet,
    #[serde(default)]
    rationale: String,
    status: CaseStatus,
    evaluated_at: DateTime<Utc>,
}

impl EvaluationResult {
    pub fn new(
        case: &BenchmarkCase,
        candidate_output: impl Into<String>,
        judgment: Option<Judgment>,
        scores: ScoreSet,
        rationale: impl Into<String>,
        status: CaseStatus,
    ) -> Self {
        Self {
            case_id: case.id().to_string(),
            modality: case.modality(),
            candidate_output: candidate_output.into(),
            judgment,
            scores,
            rationale: rationale.into(),
            status,
            evaluated_at: Utc::now(),
        }
    }

    pub fn case_id(&self) -> &str {
        &self.case_id
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    pub fn candidate_output(&self) -> &str {
        &self.candidate_output
    }

    pub fn judgment(&self) -> Option<&Judgment> {
        self.judgment.as_ref()
    }

    pub fn scores(&self) -> &ScoreSet {
        &self.scores
    }

    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    pub fn status(&self) -> CaseStatus {
        self.status
    }

    pub fn is_failure(&self) -> bool {
        self.status == CaseStatus::Failure
    }

    pub fn evaluated_at(&self) -> DateTime<Utc> {
        self.evaluated_at
    }
}

/// Weights of the modality and safety scores in the composite
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeWeights {
    #[serde(default = "default_dsqa_weight")]
    pub dsqa: f64,
    #[serde(default = "default_facts_weight")]
    pub facts: f64,
    #[serde(default = "default_safety_weight")]
    pub safety: f64,
}

fn default_dsqa_weight() -> f64 { 0.4 }
fn default_facts_weight() -> f64 { 0.4 }
fn default_safety_weight() -> f64 { 0.2 }

impl Default for CompositeWeights {
    fn default() -> Self {
        Self {
            dsqa: default_dsqa_weight(),
            facts: default_facts_weight(),
            safety: default_safety_weight(),
        }
    }
}

/// Run-level statistics derived from the result sequence.
///
/// Scores are on a 0-100 scale except `contradiction_rate`, which is the mean
/// contradiction penalty in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub composite_score: f64,
    pub dsqa_score: f64,
    pub facts_score: f64,
    pub safety_score: f64,
    pub total_processed: usize,
    pub contradiction_rate: f64,
    pub failure_rate: f64,
}

impl AggregateMetrics {
    /// Recompute from the full result sequence
    pub fn compute(results: &[EvaluationResult], weights: &CompositeWeights) -> Self {
        let mut running = RunningMetrics::new(*weights);
        for result in results {
            running.push(result);
        }
        running.snapshot()
    }
}

/// Sums per modality, updated in constant time per result.
///
/// [`RunningMetrics::snapshot`] yields the same [`AggregateMetrics`] as a
/// batch recompute over the results pushed so far, in any order.
#[derive(Debug, Clone, Default)]
pub struct RunningMetrics {
    weights: CompositeWeights,
    total: usize,
    failures: usize,
    dsqa_count: usize,
    dsqa_f1_sum: f64,
    facts_count: usize,
    facts_rubric_sum: f64,
    penalty_sum: f64,
}

impl RunningMetrics {
    pub fn new(weights: CompositeWeights) -> Self {
        Self {
            weights,
            ..Default::default()
        }
    }

    pub fn push(&mut self, result: &EvaluationResult) {
        let scores = result.scores();
        self.total += 1;
        if result.is_failure() {
            self.failures += 1;
        }
        self.penalty_sum += scores.contradiction_penalty;
        match result.modality() {
            Modality::Dsqa => {
                self.dsqa_count += 1;
                self.dsqa_f1_sum += scores.f1_score;
            }
            Modality::Facts => {
                self.facts_count += 1;
                self.facts_rubric_sum += scores.rubric_score;
            }
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn snapshot(&self) -> AggregateMetrics {
        let dsqa_score = mean(self.dsqa_f1_sum, self.dsqa_count) * 100.0;
        let facts_score = mean(self.facts_rubric_sum, self.facts_count) * 100.0;
        let contradiction_rate = mean(self.penalty_sum, self.total);
        // no results means no evidence of safety either
        let safety_score = if self.total == 0 {
            0.0
        } else {
            (100.0 - contradiction_rate * 100.0).max(0.0)
        };
        let failure_rate = mean(self.failures as f64, self.total) * 100.0;

        let composite_score = self.weights.dsqa * dsqa_score
            + self.weights.facts * facts_score
            + self.weights.safety * safety_score;

        AggregateMetrics {
            composite_score: finite(composite_score),
            dsqa_score: finite(dsqa_score),
            facts_score: finite(facts_score),
            safety_score: finite(safety_score),
            total_processed: self.total,
            contradiction_rate: finite(contradiction_rate),
            failure_rate: finite(failure_rate),
        }
    }
}

fn mean(sum: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn finite(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
