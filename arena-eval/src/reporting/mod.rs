//! Results reporting

pub mod result_log;

pub use result_log::{read_results_jsonl, ResultLog};

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::analysis::{AggregateMetrics, CaseStatus, EvaluationResult};
use crate::cases::Modality;
use crate::runner::RunReport;

/// JSON summary export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonSummary {
    pub run_id: String,
    pub timestamp: String,
    pub subject: String,
    pub judge: String,
    pub started_at: String,
    pub finished_at: String,
    pub total_cases: usize,
    pub cancelled: bool,
    pub metrics: AggregateMetrics,
    pub modality_breakdown: Vec<ModalitySummary>,
    pub failed_cases: Vec<String>,
    pub detailed_results_file: String,
}

/// Counts and mean scores for one modality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModalitySummary {
    pub modality: Modality,
    pub cases: usize,
    pub failures: usize,
    pub avg_f1: f64,
    pub avg_rubric: f64,
}

impl ModalitySummary {
    pub fn from_results(results: &[EvaluationResult]) -> Vec<Self> {
        Modality::all()
            .into_iter()
            .filter_map(|modality| {
                let subset: Vec<_> = results.iter().filter(|r| r.modality() == modality).collect();
                if subset.is_empty() {
                    return None;
                }
                let n = subset.len() as f64;
                Some(Self {
                    modality,
                    cases: subset.len(),
                    failures: subset.iter().filter(|r| r.is_failure()).count(),
                    avg_f1: subset.iter().map(|r| r.scores().f1_score).sum::<f64>() / n,
                    avg_rubric: subset.iter().map(|r| r.scores().rubric_score).sum::<f64>() / n,
                })
            })
            .collect()
    }
}

impl JsonSummary {
    /// Create from a run report
    pub fn from_report(report: &RunReport, detailed_file: impl Into<String>) -> Self {
        Self {
            run_id: report.run_id.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            subject: report.subject.clone(),
            judge: report.judge.clone(),
            started_at: report.started_at.to_rfc3339(),
            finished_at: report.finished_at.to_rfc3339(),
            total_cases: report.total_cases,
            cancelled: report.cancelled,
            metrics: report.metrics,
            modality_breakdown: ModalitySummary::from_results(&report.results),
            failed_cases: report
                .results
                .iter()
                .filter(|r| r.is_failure())
                .map(|r| r.case_id().to_string())
                .collect(),
            detailed_results_file: detailed_file.into(),
        }
    }

    /// Write to JSON file
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }
}

/// Generate a console report
pub fn print_console_report(results: &[EvaluationResult], metrics: &AggregateMetrics) {
    println!("\n=== ARENA Evaluation Results ===\n");
    println!("Cases Processed: {}\n", metrics.total_processed);

    println!("Aggregate Scores:");
    println!("{:-<50}", "");
    println!("  Composite:          {:>6.1}", metrics.composite_score);
    println!("  DSQA (reasoning):   {:>6.1}", metrics.dsqa_score);
    println!("  FACTS (grounding):  {:>6.1}", metrics.facts_score);
    println!("  Safety:             {:>6.1}", metrics.safety_score);
    println!("  Contradiction rate: {:>6.2}", metrics.contradiction_rate);
    println!("  Failure rate:       {:>5.1}%", metrics.failure_rate);

    if !results.is_empty() {
        println!("\nPer-Case Results:");
        println!("{:-<50}", "");
        println!(
            "  {:<12} {:<6} {:<8} {:>5} {:>6} {:>7} {:>5}",
            "Case", "Type", "Status", "F1", "Rubric", "Penalty", "Chain"
        );
        for result in results {
            let scores = result.scores();
            println!(
                "  {:<12} {:<6} {:<8} {:>5.2} {:>6.2} {:>7.2} {:>5.2}",
                result.case_id(),
                result.modality(),
                result.status(),
                scores.f1_score,
                scores.rubric_score,
                scores.contradiction_penalty,
                scores.chain_completeness
            );
        }

        let failures: Vec<_> = results
            .iter()
            .filter(|r| r.status() == CaseStatus::Failure && !r.rationale().is_empty())
            .collect();
        if !failures.is_empty() {
            println!("\nFailure Notes:");
            println!("{:-<50}", "");
            for result in failures {
                println!("  {}: {}", result.case_id(), result.rationale());
            }
        }
    }

    println!("\n{:=<50}", "");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ScoreSet;
    use crate::cases::BenchmarkCase;
    use chrono::Utc;

    fn sample_report() -> RunReport {
        let dsqa = BenchmarkCase::dsqa("D-1", "x", "q", ["a"]);
        let facts = BenchmarkCase::facts("F-1", "x", "q", "c", ["a"]);
        let results = vec![
            EvaluationResult::new(
                &dsqa,
                "{}",
                None,
                ScoreSet {
                    f1_score: 0.8,
                    ..ScoreSet::zero()
                },
                "",
                CaseStatus::Success,
            ),
            EvaluationResult::new(&facts, "{}", None, ScoreSet::zero(), "bad", CaseStatus::Failure),
        ];
        RunReport {
            run_id: "run-test".into(),
            subject: "s".into(),
            judge: "j".into(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            total_cases: 2,
            cancelled: false,
            metrics: AggregateMetrics::compute(&results, &Default::default()),
            results,
        }
    }

    #[test]
    fn test_summary_breakdown() {
        let summary = JsonSummary::from_report(&sample_report(), "results.jsonl");
        assert_eq!(summary.failed_cases, vec!["F-1".to_string()]);
        assert_eq!(summary.modality_breakdown.len(), 2);
        assert_eq!(summary.modality_breakdown[0].modality, Modality::Dsqa);
        assert_eq!(summary.modality_breakdown[0].avg_f1, 0.8);
        assert_eq!(summary.modality_breakdown[1].failures, 1);
    }

    #[test]
    fn test_summary_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        JsonSummary::from_report(&sample_report(), "results.jsonl")
            .write_to_file(&path)
            .unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["run_id"], "run-test");
        assert_eq!(value["metrics"]["total_processed"], 2);
        assert_eq!(value["metrics"]["failure_rate"], 50.0);
    }
}
