//! Per-case scoring against ground truth

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::judgment::{DsqaJudgment, Judgment, ReasoningStep};
use super::matching::{normalize, FactMatcher, MatchPolicy};
use crate::cases::BenchmarkCase;

/// Tunable scoring policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    /// Cases with F1 below this are failures
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: f64,
    /// Contradiction count at which the penalty reaches 1.0
    #[serde(default = "default_contradiction_saturation")]
    pub contradiction_saturation: u32,
    /// Weight of overall confidence in the DSQA rubric score; chain
    /// completeness takes the remainder
    #[serde(default = "default_dsqa_confidence_weight")]
    pub dsqa_confidence_weight: f64,
    #[serde(default, rename = "matching", alias = "match_policy")]
    pub match_policy: MatchPolicy,
}

fn default_failure_threshold() -> f64 { 0.4 }
fn default_contradiction_saturation() -> u32 { 2 }
fn default_dsqa_confidence_weight() -> f64 { 0.5 }

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            contradiction_saturation: default_contradiction_saturation(),
            dsqa_confidence_weight: default_dsqa_confidence_weight(),
            match_policy: MatchPolicy::default(),
        }
    }
}

/// Scores for one case; every field is finite
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreSet {
    pub atomic_recall: f64,
    pub atomic_precision: f64,
    pub f1_score: f64,
    pub contradiction_penalty: f64,
    pub rubric_score: f64,
    pub chain_completeness: f64,
}

impl ScoreSet {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    fn finite(self) -> Self {
        Self {
            atomic_recall: finite_unit(self.atomic_recall),
            atomic_precision: finite_unit(self.atomic_precision),
            f1_score: finite_unit(self.f1_score),
            contradiction_penalty: if self.contradiction_penalty.is_finite() {
                self.contradiction_penalty.max(0.0)
            } else {
                0.0
            },
            rubric_score: finite_unit(self.rubric_score),
            chain_completeness: finite_unit(self.chain_completeness),
        }
    }
}

/// Outcome of a case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CaseStatus {
    Success,
    Failure,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Success => "SUCCESS",
            CaseStatus::Failure => "FAILURE",
        }
    }
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pure scorer for judgments
#[derive(Clone)]
pub struct Scorer {
    policy: ScoringPolicy,
    matcher: Arc<dyn FactMatcher>,
}

impl Scorer {
    /// Create a scorer matching facts with the policy's `match_policy`
    pub fn new(policy: ScoringPolicy) -> Self {
        let matcher = Arc::new(policy.match_policy);
        Self { policy, matcher }
    }

    /// Replace the fact matcher
    pub fn with_matcher(mut self, matcher: Arc<dyn FactMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Score a case and decide its status.
    ///
    /// A missing judgment or a failed candidate call is always a failure.
    pub fn evaluate(
        &self,
        case: &BenchmarkCase,
        judgment: Option<&Judgment>,
        candidate_failed: bool,
    ) -> (ScoreSet, CaseStatus) {
        let scores = self.score(case, judgment);
        let status = if judgment.is_none()
            || candidate_failed
            || scores.f1_score < self.policy.failure_threshold
        {
            CaseStatus::Failure
        } else {
            CaseStatus::Success
        };
        (scores, status)
    }

    /// Compute the score set; all zero without a judgment
    pub fn score(&self, case: &BenchmarkCase, judgment: Option<&Judgment>) -> ScoreSet {
        let Some(judgment) = judgment else {
            return ScoreSet::zero();
        };

        let asserted: Vec<&str> = judgment
            .asserted_facts()
            .into_iter()
            .filter(|f| !f.trim().is_empty())
            .collect();
        let truth = distinct_truth(case.ground_truth());

        let atomic_recall = self.recall(&asserted, &truth);
        let atomic_precision = self.precision(&asserted, &truth);
        let f1_score = f1(atomic_recall, atomic_precision);

        let scores = match judgment {
            Judgment::Dsqa(j) => {
                let chain_completeness = chain_completeness(&j.reasoning_steps);
                ScoreSet {
                    atomic_recall,
                    atomic_precision,
                    f1_score,
                    contradiction_penalty: 0.0,
                    rubric_score: self.dsqa_rubric(j, chain_completeness),
                    chain_completeness,
                }
            }
            Judgment::Facts(j) => ScoreSet {
                atomic_recall,
                atomic_precision,
                f1_score,
                contradiction_penalty: self.contradiction_penalty(j.contradictions.len()),
                rubric_score: j.rubric_score,
                chain_completeness: 0.0,
            },
        };

        scores.finite()
    }

    /// Share of ground-truth facts stated by at least one asserted fact
    fn recall(&self, asserted: &[&str], truth: &[&str]) -> f64 {
        if truth.is_empty() {
            return 0.0;
        }
        let covered = truth
            .iter()
            .filter(|t| asserted.iter().any(|a| self.matcher.matches(a, t)))
            .count();
        covered as f64 / truth.len() as f64
    }

    /// Share of asserted facts that state some ground-truth fact
    fn precision(&self, asserted: &[&str], truth: &[&str]) -> f64 {
        if asserted.is_empty() {
            return 0.0;
        }
        let correct = asserted
            .iter()
            .filter(|a| truth.iter().any(|t| self.matcher.matches(a, t)))
            .count();
        correct as f64 / asserted.len() as f64
    }

    fn contradiction_penalty(&self, contradictions: usize) -> f64 {
        let saturation = self.policy.contradiction_saturation.max(1) as f64;
        (contradictions as f64 / saturation).min(1.0)
    }

    fn dsqa_rubric(&self, judgment: &DsqaJudgment, chain_completeness: f64) -> f64 {
        let weight = finite_unit(self.policy.dsqa_confidence_weight);
        weight * judgment.overall_confidence + (1.0 - weight) * chain_completeness
    }
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(ScoringPolicy::default())
    }
}

impl std::fmt::Debug for Scorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scorer").field("policy", &self.policy).finish()
    }
}

/// Harmonic mean of recall and precision; 0 when both are 0
pub fn f1(recall: f64, precision: f64) -> f64 {
    let sum = recall + precision;
    if sum > 0.0 && sum.is_finite() {
        2.0 * recall * precision / sum
    } else {
        0.0
    }
}

/// Share of reasoning steps forming an unbroken, sourced chain.
///
/// Walks indices 1, 2, 3, ... and stops at the first index that is missing or
/// whose step cites no non-blank source. The length of that prefix divided by
/// the number of steps is the completeness; no steps scores 0.
pub fn chain_completeness(steps: &[ReasoningStep]) -> f64 {
    if steps.is_empty() {
        return 0.0;
    }

    let mut chained = 0usize;
    for expected in 1..=steps.len() {
        let linked = steps.iter().any(|s| {
            s.step_index as usize == expected && s.sources.iter().any(|src| !src.trim().is_empty())
        });
        if !linked {
            break;
        }
        chained += 1;
    }
    chained as f64 / steps.len() as f64
}

/// Ground truth as a set: blank entries dropped, normalized duplicates merged
fn distinct_truth(ground_truth: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    ground_truth
        .iter()
        .map(String::as_str)
        .filter(|t| {
            let key = normalize(t);
            !key.is_empty() && seen.insert(key)
        })
        .collect()
}

fn finite_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::judgment::{
        AtomicAnswer, Contradiction, FactsJudgment, MatchedFact,
    };

    fn answer(fact: &str) -> AtomicAnswer {
        AtomicAnswer {
            fact: fact.to_string(),
            confidence: 0.9,
            evidence: vec![],
            step_index: 1,
        }
    }

    fn step(index: u32, sources: &[&str]) -> ReasoningStep {
        ReasoningStep {
            step_index: index,
            text: format!("step {}", index),
            sources: sources.iter().map(|s| s.to_string()).collect(),
            confidence: 0.8,
        }
    }

    fn dsqa(facts: &[&str], steps: Vec<ReasoningStep>, confidence: f64) -> Judgment {
        Judgment::Dsqa(DsqaJudgment {
            case_id: "D".into(),
            answers: facts.iter().map(|f| answer(f)).collect(),
            reasoning_steps: steps,
            overall_confidence: confidence,
        })
    }

    fn facts(matched: &[&str], contradictions: usize, rubric: f64) -> Judgment {
        Judgment::Facts(FactsJudgment {
            case_id: "F".into(),
            matched_facts: matched
                .iter()
                .map(|f| MatchedFact {
                    fact: f.to_string(),
                    confidence: 0.9,
                    image_regions: vec![],
                    evidence: String::new(),
                })
                .collect(),
            contradictions: (0..contradictions)
                .map(|i| Contradiction {
                    text: format!("claim {}", i),
                    reason: "conflicts".into(),
                })
                .collect(),
            rubric_score: rubric,
            overall_confidence: 0.5,
        })
    }

    #[test]
    fn test_partial_recall_full_precision() {
        let case = BenchmarkCase::dsqa("D", "x", "q", ["A", "B", "C"]);
        let judgment = dsqa(&["A", "B"], vec![step(1, &["s"])], 0.8);

        let (scores, status) = Scorer::default().evaluate(&case, Some(&judgment), false);
        assert!((scores.atomic_recall - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(scores.atomic_precision, 1.0);
        assert!((scores.f1_score - 0.8).abs() < 1e-9);
        assert_eq!(status, CaseStatus::Success);
    }

    #[test]
    fn test_missing_judgment_is_zero_failure() {
        let case = BenchmarkCase::dsqa("D", "x", "q", ["A"]);
        let (scores, status) = Scorer::default().evaluate(&case, None, false);
        assert!(scores.is_zero());
        assert_eq!(status, CaseStatus::Failure);
    }

    #[test]
    fn test_superset_gives_full_recall_under_exact() {
        let policy = ScoringPolicy {
            match_policy: MatchPolicy::Exact,
            ..Default::default()
        };
        let case = BenchmarkCase::dsqa("D", "x", "q", ["A", "B"]);
        let judgment = dsqa(&["B", "A", "Z"], vec![], 0.0);

        let scores = Scorer::new(policy).score(&case, Some(&judgment));
        assert_eq!(scores.atomic_recall, 1.0);
        assert!((scores.atomic_precision - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_matches_gives_zero_f1() {
        let case = BenchmarkCase::dsqa("D", "x", "q", ["A", "B"]);
        let judgment = dsqa(&["Q"], vec![], 1.0);
        let (scores, status) = Scorer::default().evaluate(&case, Some(&judgment), false);
        assert_eq!(scores.atomic_recall, 0.0);
        assert_eq!(scores.atomic_precision, 0.0);
        assert_eq!(scores.f1_score, 0.0);
        assert_eq!(status, CaseStatus::Failure);
    }

    #[test]
    fn test_empty_assertions_and_empty_truth() {
        let case = BenchmarkCase::dsqa("D", "x", "q", Vec::<String>::new());
        let judgment = dsqa(&[], vec![], 0.0);
        let scores = Scorer::default().score(&case, Some(&judgment));
        assert_eq!(scores.f1_score, 0.0);
        assert!(scores.f1_score.is_finite());
    }

    #[test]
    fn test_generic_word_does_not_match_longer_truth() {
        let case = BenchmarkCase::dsqa(
            "D",
            "x",
            "q",
            ["Torsional vibration mode", "Aeroelastic flutter mode"],
        );
        let judgment = dsqa(&["mode"], vec![step(1, &["s"])], 1.0);

        let (scores, status) = Scorer::default().evaluate(&case, Some(&judgment), false);
        assert_eq!(scores.atomic_recall, 0.0);
        assert_eq!(scores.atomic_precision, 0.0);
        assert_eq!(scores.f1_score, 0.0);
        assert_eq!(status, CaseStatus::Failure);
    }

    #[test]
    fn test_duplicate_truth_counts_once() {
        let case = BenchmarkCase::dsqa("D", "x", "q", ["A", "a.", "B"]);
        let judgment = dsqa(&["A"], vec![], 0.0);
        let scores = Scorer::default().score(&case, Some(&judgment));
        assert_eq!(scores.atomic_recall, 0.5);
    }

    #[test]
    fn test_contradiction_penalty_saturates() {
        let case = BenchmarkCase::facts("F", "x", "q", "c", ["X"]);
        let scorer = Scorer::default();

        let one = scorer.score(&case, Some(&facts(&["X"], 1, 0.9)));
        assert_eq!(one.contradiction_penalty, 0.5);

        let two = scorer.score(&case, Some(&facts(&["X"], 2, 0.9)));
        assert_eq!(two.contradiction_penalty, 1.0);

        let five = scorer.score(&case, Some(&facts(&["X"], 5, 0.9)));
        assert_eq!(five.contradiction_penalty, 1.0);
        assert_eq!(five.rubric_score, 0.9);
        assert_eq!(five.chain_completeness, 0.0);
    }

    #[test]
    fn test_zero_saturation_treated_as_one() {
        let policy = ScoringPolicy {
            contradiction_saturation: 0,
            ..Default::default()
        };
        let case = BenchmarkCase::facts("F", "x", "q", "c", ["X"]);
        let scores = Scorer::new(policy).score(&case, Some(&facts(&["X"], 1, 0.9)));
        assert_eq!(scores.contradiction_penalty, 1.0);
    }

    #[test]
    fn test_dsqa_has_no_penalty() {
        let case = BenchmarkCase::dsqa("D", "x", "q", ["A"]);
        let scores = Scorer::default().score(&case, Some(&dsqa(&["A"], vec![], 0.5)));
        assert_eq!(scores.contradiction_penalty, 0.0);
    }

    #[test]
    fn test_chain_completeness() {
        assert_eq!(chain_completeness(&[]), 0.0);
        assert_eq!(chain_completeness(&[step(1, &["a"]), step(2, &["b"])]), 1.0);
        // gap at 3
        let gapped = [step(1, &["a"]), step(2, &["b"]), step(4, &["c"])];
        assert!((chain_completeness(&gapped) - 2.0 / 3.0).abs() < 1e-9);
        // unsourced first step breaks the chain
        assert_eq!(chain_completeness(&[step(1, &[" "]), step(2, &["b"])]), 0.0);
        // order in the list does not matter
        assert_eq!(chain_completeness(&[step(2, &["b"]), step(1, &["a"])]), 1.0);
        // zero-based indexing is a gap at 1
        assert_eq!(chain_completeness(&[step(0, &["a"]), step(1, &["b"])]), 0.0);
    }

    #[test]
    fn test_dsqa_rubric_blends_confidence_and_chain() {
        let case = BenchmarkCase::dsqa("D", "x", "q", ["A"]);
        let judgment = dsqa(&["A"], vec![step(1, &["s"]), step(3, &["s"])], 0.8);
        let scores = Scorer::default().score(&case, Some(&judgment));
        assert_eq!(scores.chain_completeness, 0.5);
        assert!((scores.rubric_score - 0.65).abs() < 1e-9);
    }

    #[test]
    fn test_candidate_failure_forces_failure() {
        let case = BenchmarkCase::dsqa("D", "x", "q", ["A"]);
        let judgment = dsqa(&["A"], vec![], 1.0);
        let (scores, status) = Scorer::default().evaluate(&case, Some(&judgment), true);
        assert_eq!(scores.f1_score, 1.0);
        assert_eq!(status, CaseStatus::Failure);
    }

    #[test]
    fn test_threshold_is_configurable() {
        let case = BenchmarkCase::dsqa("D", "x", "q", ["A", "B", "C", "D"]);
        let judgment = dsqa(&["A"], vec![], 1.0);
        // recall 0.25, precision 1.0, f1 0.4
        let lenient = Scorer::new(ScoringPolicy {
            failure_threshold: 0.3,
            ..Default::default()
        });
        let strict = Scorer::new(ScoringPolicy {
            failure_threshold: 0.5,
            ..Default::default()
        });
        assert_eq!(lenient.evaluate(&case, Some(&judgment), false).1, CaseStatus::Success);
        assert_eq!(strict.evaluate(&case, Some(&judgment), false).1, CaseStatus::Failure);
    }

    #[test]
    fn test_custom_matcher() {
        struct Always;
        impl FactMatcher for Always {
            fn matches(&self, _asserted: &str, _truth: &str) -> bool {
                true
            }
        }
        let case = BenchmarkCase::dsqa("D", "x", "q", ["A", "B"]);
        let scorer = Scorer::default().with_matcher(Arc::new(Always));
        let scores = scorer.score(&case, Some(&dsqa(&["zzz"], vec![], 0.0)));
        assert_eq!(scores.atomic_recall, 1.0);
        assert_eq!(scores.atomic_precision, 1.0);
    }
}
