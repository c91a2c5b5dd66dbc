//! Sequential evaluation run driver
//!
//! A run walks the dataset in order. Each case gets one subject call, one
//! judge call, a parse, a score and an append to the result sequence, then
//! the run pauses for the pacing interval before the next case. Every model
//! call failure, rejected credentials included, becomes a FAILURE result;
//! only an unusable dataset ends a run early.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use super::models::{EchoJudge, Judge, LlmJudge, LlmSubject, SubjectModel, SUBJECT_FAILURE_SENTINEL};
use super::progress::{ChannelSink, ProgressSink, RunEvent};
use crate::analysis::{
    parse_judgment, AggregateMetrics, CompositeWeights, EvaluationResult, RunningMetrics, Scorer,
};
use crate::cases::{validate_cases, BenchmarkCase, LoadError};
use crate::config::Config;
use crate::providers::{create_provider, ProviderError, ProviderResult};

/// Lifecycle of an orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Error,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// Errors that stop a run from starting or finishing
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dataset has no cases")]
    EmptyDataset,

    #[error("Invalid dataset: {0}")]
    InvalidDataset(#[from] LoadError),

    #[error("Cannot start a run while {0}")]
    NotIdle(RunState),
}

/// Timing and aggregation settings for a run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    /// Pause after each case except the last
    pub pacing: Duration,
    /// Upper bound on each subject or judge call
    pub call_timeout: Duration,
    pub weights: CompositeWeights,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            pacing: Duration::from_millis(2_000),
            call_timeout: Duration::from_millis(120_000),
            weights: CompositeWeights::default(),
        }
    }
}

impl RunSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            pacing: Duration::from_millis(config.benchmark.pacing_ms),
            call_timeout: Duration::from_millis(config.benchmark.timeout_ms),
            weights: config.scoring.weights,
        }
    }
}

/// Everything a finished or cancelled run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub subject: String,
    pub judge: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_cases: usize,
    pub cancelled: bool,
    pub metrics: AggregateMetrics,
    pub results: Vec<EvaluationResult>,
}

enum CaseOutcome {
    Scored(EvaluationResult),
    Cancelled,
}

/// Drives subject and judge calls over a dataset
pub struct Orchestrator {
    subject: Arc<dyn SubjectModel>,
    judge: Arc<dyn Judge>,
    scorer: Scorer,
    settings: RunSettings,
    sinks: Vec<Arc<dyn ProgressSink>>,
    state: RunState,
    results: Vec<EvaluationResult>,
    progress: f64,
    current_log: String,
}

impl Orchestrator {
    pub fn new(subject: Arc<dyn SubjectModel>, judge: Arc<dyn Judge>) -> Self {
        Self {
            subject,
            judge,
            scorer: Scorer::default(),
            settings: RunSettings::default(),
            sinks: Vec::new(),
            state: RunState::Idle,
            results: Vec::new(),
            progress: 0.0,
            current_log: String::new(),
        }
    }

    /// Build provider-backed subject and judge from configuration.
    ///
    /// Missing credentials fail here, before any run exists. With
    /// `self_judge` the candidate's own output is scored and no judge
    /// credentials are needed.
    pub fn from_config(config: &Config, self_judge: bool) -> Result<Self, RunError> {
        let subject_provider =
            create_provider(&config.subject).map_err(|e| RunError::Config(e.to_string()))?;
        let subject = Arc::new(LlmSubject::new(subject_provider, &config.subject));

        let judge: Arc<dyn Judge> = if self_judge {
            Arc::new(EchoJudge)
        } else {
            let judge_provider =
                create_provider(&config.judge).map_err(|e| RunError::Config(e.to_string()))?;
            Arc::new(LlmJudge::new(judge_provider, &config.judge))
        };

        Ok(Self::new(subject, judge)
            .with_scorer(Scorer::new(config.scoring.policy()))
            .with_settings(RunSettings::from_config(config)))
    }

    pub fn with_scorer(mut self, scorer: Scorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Results of the current or most recent run, in case order
    pub fn results(&self) -> &[EvaluationResult] {
        &self.results
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn current_log(&self) -> &str {
        &self.current_log
    }

    /// Batch recompute over the current results
    pub fn metrics(&self) -> AggregateMetrics {
        AggregateMetrics::compute(&self.results, &self.settings.weights)
    }

    /// Return to Idle, clearing progress and the status line.
    ///
    /// Results stay readable until the next run starts.
    pub fn reset(&mut self) {
        tracing::debug!("Resetting orchestrator from {}", self.state);
        self.state = RunState::Idle;
        self.progress = 0.0;
        self.current_log.clear();
    }

    /// Evaluate `cases` in order until done or `cancel` fires.
    ///
    /// Cancellation returns Ok with `cancelled` set and the state back at
    /// Idle; the case in flight is dropped and earlier results are kept.
    pub async fn run(
        &mut self,
        cases: &[BenchmarkCase],
        cancel: &CancellationToken,
    ) -> Result<RunReport, RunError> {
        if self.state != RunState::Idle {
            return Err(RunError::NotIdle(self.state));
        }

        let started_at = Utc::now();
        let run_id = format!("run-{}", started_at.format("%Y%m%d-%H%M%S"));
        let total = cases.len();

        self.state = RunState::Running;
        self.results.clear();
        self.progress = 0.0;
        self.current_log.clear();
        let mut metrics = RunningMetrics::new(self.settings.weights);

        tracing::info!(
            "Starting {} with {} cases (subject {}, judge {})",
            run_id,
            total,
            self.subject.name(),
            self.judge.name()
        );
        self.emit(RunEvent::Started {
            run_id: run_id.clone(),
            total_cases: total,
        });

        if let Err(error) = check_dataset(cases) {
            return Err(self.fail(error));
        }

        for (index, case) in cases.iter().enumerate() {
            self.set_status(format!(
                "Processing case {}/{}: {}",
                index + 1,
                total,
                case.label()
            ));

            let result = match self.evaluate_case(case, cancel).await {
                CaseOutcome::Scored(result) => result,
                CaseOutcome::Cancelled => {
                    return Ok(self.finish_cancelled(run_id, started_at, total, &metrics));
                }
            };

            tracing::info!(
                "{} {}: F1 {:.2}, rubric {:.2}",
                result.status(),
                case.id(),
                result.scores().f1_score,
                result.scores().rubric_score
            );

            metrics.push(&result);
            self.results.push(result.clone());
            self.emit(RunEvent::CaseScored(Box::new(result)));
            self.emit(RunEvent::Metrics(metrics.snapshot()));

            self.progress = (index + 1) as f64 / total as f64 * 100.0;
            self.emit(RunEvent::Progress {
                completed: index + 1,
                total,
                percent: self.progress,
            });

            if index + 1 < total && !self.settings.pacing.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Ok(self.finish_cancelled(run_id, started_at, total, &metrics));
                    }
                    _ = tokio::time::sleep(self.settings.pacing) => {}
                }
            }
        }

        let final_metrics = metrics.snapshot();
        self.state = RunState::Completed;
        self.set_status("Evaluation complete".to_string());
        tracing::info!(
            "{} complete: composite {:.1}, failure rate {:.1}%",
            run_id,
            final_metrics.composite_score,
            final_metrics.failure_rate
        );
        self.emit(RunEvent::Completed(final_metrics));

        Ok(self.report(run_id, started_at, total, final_metrics, false))
    }

    /// Run on a background task, streaming events through the returned handle
    pub fn spawn(mut self, cases: Vec<BenchmarkCase>) -> RunHandle {
        let (tx, events) = mpsc::unbounded_channel();
        self.sinks.push(Arc::new(ChannelSink::new(tx)));

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let join = tokio::spawn(async move {
            let outcome = self.run(&cases, &token).await;
            // closes the event stream
            self.sinks.pop();
            (self, outcome)
        });

        RunHandle { events, cancel, join }
    }

    async fn evaluate_case(&self, case: &BenchmarkCase, cancel: &CancellationToken) -> CaseOutcome {
        let subject_result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return CaseOutcome::Cancelled,
            result = self.bounded(self.subject.respond(case)) => result,
        };

        let (candidate_output, candidate_failed) = match subject_result {
            Ok(output) => (output, false),
            Err(error) => {
                if error.is_config() {
                    tracing::error!("Subject credentials rejected on {}: {}", case.id(), error);
                } else {
                    tracing::warn!("Subject call failed for {}: {}", case.id(), error);
                }
                (SUBJECT_FAILURE_SENTINEL.to_string(), true)
            }
        };

        let judge_result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return CaseOutcome::Cancelled,
            result = self.bounded(self.judge.judge(case, &candidate_output)) => result,
        };

        let (judgment, rationale) = match judge_result {
            Ok(verdict) => match parse_judgment(&verdict.raw, case) {
                Ok(judgment) => (Some(judgment), verdict.rationale),
                Err(error) => {
                    tracing::warn!("Unusable judgment for {}: {}", case.id(), error);
                    let detail = format!("Judgment parse error: {}", error);
                    let rationale = if verdict.rationale.is_empty() {
                        detail
                    } else {
                        format!("{} ({})", detail, verdict.rationale)
                    };
                    (None, rationale)
                }
            },
            Err(error) => {
                if error.is_config() {
                    tracing::error!("Judge credentials rejected on {}: {}", case.id(), error);
                } else {
                    tracing::warn!("Judge call failed for {}: {}", case.id(), error);
                }
                (None, format!("Judge call failed: {}", error))
            }
        };

        let (scores, status) = self
            .scorer
            .evaluate(case, judgment.as_ref(), candidate_failed);
        CaseOutcome::Scored(EvaluationResult::new(
            case,
            candidate_output,
            judgment,
            scores,
            rationale,
            status,
        ))
    }

    /// Apply the call timeout to a provider-backed call
    async fn bounded<T>(&self, call: impl Future<Output = ProviderResult<T>>) -> ProviderResult<T> {
        match tokio::time::timeout(self.settings.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                timeout_ms: self.settings.call_timeout.as_millis() as u64,
            }),
        }
    }

    fn emit(&self, event: RunEvent) {
        for sink in &self.sinks {
            sink.on_event(&event);
        }
    }

    fn set_status(&mut self, line: String) {
        tracing::debug!("{}", line);
        self.current_log = line.clone();
        self.emit(RunEvent::Status(line));
    }

    fn fail(&mut self, error: RunError) -> RunError {
        tracing::error!("Run failed: {}", error);
        self.state = RunState::Error;
        self.emit(RunEvent::Failed(error.to_string()));
        error
    }

    fn finish_cancelled(
        &mut self,
        run_id: String,
        started_at: DateTime<Utc>,
        total: usize,
        metrics: &RunningMetrics,
    ) -> RunReport {
        let completed = self.results.len();
        tracing::warn!("{} cancelled after {} of {} cases", run_id, completed, total);
        self.state = RunState::Idle;
        self.current_log.clear();
        self.emit(RunEvent::Cancelled { completed });
        self.report(run_id, started_at, total, metrics.snapshot(), true)
    }

    fn report(
        &self,
        run_id: String,
        started_at: DateTime<Utc>,
        total_cases: usize,
        metrics: AggregateMetrics,
        cancelled: bool,
    ) -> RunReport {
        RunReport {
            run_id,
            subject: self.subject.name().to_string(),
            judge: self.judge.name().to_string(),
            started_at,
            finished_at: Utc::now(),
            total_cases,
            cancelled,
            metrics,
            results: self.results.clone(),
        }
    }
}

fn check_dataset(cases: &[BenchmarkCase]) -> Result<(), RunError> {
    if cases.is_empty() {
        return Err(RunError::EmptyDataset);
    }
    validate_cases(cases)?;
    Ok(())
}

/// A run executing on a background task
pub struct RunHandle {
    events: mpsc::UnboundedReceiver<RunEvent>,
    cancel: CancellationToken,
    join: JoinHandle<(Orchestrator, Result<RunReport, RunError>)>,
}

impl RunHandle {
    /// Next event; `None` once the run has ended and all events are drained
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }

    /// Ask the run to stop at its next suspension point
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the run, getting the orchestrator back with the outcome
    pub async fn join(self) -> Result<(Orchestrator, Result<RunReport, RunError>), JoinError> {
        self.join.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::CaseStatus;
    use crate::runner::models::JudgeVerdict;
    use async_trait::async_trait;

    struct EchoSubject;

    #[async_trait]
    impl SubjectModel for EchoSubject {
        fn name(&self) -> &str {
            "echo"
        }

        async fn respond(&self, case: &BenchmarkCase) -> ProviderResult<String> {
            let facts: Vec<String> = case
                .ground_truth()
                .iter()
                .map(|f| format!("{{\"atomic_fact\": \"{}\", \"confidence\": 0.9}}", f))
                .collect();
            Ok(format!(
                "{{\"case_id\": \"{}\", \"answers\": [{}], \"chain_of_thought_steps\": [], \"overall_confidence\": 0.8}}",
                case.id(),
                facts.join(", ")
            ))
        }
    }

    /// Echoes, except the key is rejected on one case
    struct RevokedKeySubject {
        rejected: &'static str,
    }

    #[async_trait]
    impl SubjectModel for RevokedKeySubject {
        fn name(&self) -> &str {
            "revoked-key"
        }

        async fn respond(&self, case: &BenchmarkCase) -> ProviderResult<String> {
            if case.id() == self.rejected {
                return Err(ProviderError::Config("auth error (401)".into()));
            }
            EchoSubject.respond(case).await
        }
    }

    struct RevokedKeyJudge;

    #[async_trait]
    impl Judge for RevokedKeyJudge {
        fn name(&self) -> &str {
            "revoked-key"
        }

        async fn judge(&self, _case: &BenchmarkCase, _c: &str) -> ProviderResult<JudgeVerdict> {
            Err(ProviderError::Config("quota exceeded: insufficient_quota".into()))
        }
    }

    struct SlowJudge;

    #[async_trait]
    impl Judge for SlowJudge {
        fn name(&self) -> &str {
            "slow"
        }

        async fn judge(&self, _case: &BenchmarkCase, _c: &str) -> ProviderResult<JudgeVerdict> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(JudgeVerdict {
                raw: String::new(),
                rationale: String::new(),
            })
        }
    }

    fn quick() -> RunSettings {
        RunSettings {
            pacing: Duration::ZERO,
            ..RunSettings::default()
        }
    }

    fn dsqa_cases(n: usize) -> Vec<BenchmarkCase> {
        (1..=n)
            .map(|i| BenchmarkCase::dsqa(format!("D-{}", i), "x", "q", ["alpha", "beta"]))
            .collect()
    }

    #[tokio::test]
    async fn test_run_completes_and_scores() {
        let mut orchestrator =
            Orchestrator::new(Arc::new(EchoSubject), Arc::new(EchoJudge)).with_settings(quick());
        let report = orchestrator
            .run(&dsqa_cases(2), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(orchestrator.state(), RunState::Completed);
        assert_eq!(report.results.len(), 2);
        assert!(!report.cancelled);
        assert!(report.results.iter().all(|r| r.status() == CaseStatus::Success));
        assert_eq!(report.metrics.dsqa_score, 100.0);
        assert_eq!(orchestrator.progress(), 100.0);
        assert_eq!(orchestrator.current_log(), "Evaluation complete");
    }

    #[tokio::test]
    async fn test_not_idle_until_reset() {
        let mut orchestrator =
            Orchestrator::new(Arc::new(EchoSubject), Arc::new(EchoJudge)).with_settings(quick());
        let cancel = CancellationToken::new();
        orchestrator.run(&dsqa_cases(1), &cancel).await.unwrap();

        assert!(matches!(
            orchestrator.run(&dsqa_cases(1), &cancel).await,
            Err(RunError::NotIdle(RunState::Completed))
        ));

        orchestrator.reset();
        assert_eq!(orchestrator.state(), RunState::Idle);
        assert_eq!(orchestrator.progress(), 0.0);
        assert!(orchestrator.current_log().is_empty());
        assert_eq!(orchestrator.results().len(), 1);
        assert!(orchestrator.run(&dsqa_cases(1), &cancel).await.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_ids_move_to_error() {
        let mut orchestrator = Orchestrator::new(Arc::new(EchoSubject), Arc::new(EchoJudge));
        let cases = vec![
            BenchmarkCase::dsqa("X", "x", "q", ["a"]),
            BenchmarkCase::dsqa("X", "x", "q", ["a"]),
        ];
        let outcome = orchestrator.run(&cases, &CancellationToken::new()).await;
        assert!(matches!(outcome, Err(RunError::InvalidDataset(_))));
        assert_eq!(orchestrator.state(), RunState::Error);
        assert!(orchestrator.results().is_empty());
    }

    #[tokio::test]
    async fn test_empty_dataset_is_an_error() {
        let mut orchestrator = Orchestrator::new(Arc::new(EchoSubject), Arc::new(EchoJudge));
        let outcome = orchestrator.run(&[], &CancellationToken::new()).await;
        assert!(matches!(outcome, Err(RunError::EmptyDataset)));
        assert_eq!(orchestrator.state(), RunState::Error);
    }

    #[tokio::test]
    async fn test_rejected_subject_key_fails_only_that_case() {
        let subject = RevokedKeySubject { rejected: "D-3" };
        let mut orchestrator =
            Orchestrator::new(Arc::new(subject), Arc::new(EchoJudge)).with_settings(quick());
        let report = orchestrator
            .run(&dsqa_cases(5), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(orchestrator.state(), RunState::Completed);
        assert_eq!(report.results.len(), 5);
        let rejected = &report.results[2];
        assert_eq!(rejected.case_id(), "D-3");
        assert_eq!(rejected.candidate_output(), SUBJECT_FAILURE_SENTINEL);
        assert_eq!(rejected.status(), CaseStatus::Failure);
        assert!((report.metrics.failure_rate - 20.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_rejected_judge_key_gives_null_judgments() {
        let mut orchestrator = Orchestrator::new(Arc::new(EchoSubject), Arc::new(RevokedKeyJudge))
            .with_settings(quick());
        let report = orchestrator
            .run(&dsqa_cases(2), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(orchestrator.state(), RunState::Completed);
        assert_eq!(report.results.len(), 2);
        for result in &report.results {
            assert!(result.judgment().is_none());
            assert_eq!(result.status(), CaseStatus::Failure);
            assert!(result.rationale().starts_with("Judge call failed"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_judge_timeout_is_case_failure() {
        let settings = RunSettings {
            pacing: Duration::ZERO,
            call_timeout: Duration::from_secs(5),
            ..RunSettings::default()
        };
        let mut orchestrator =
            Orchestrator::new(Arc::new(EchoSubject), Arc::new(SlowJudge)).with_settings(settings);
        let report = orchestrator
            .run(&dsqa_cases(1), &CancellationToken::new())
            .await
            .unwrap();

        let result = &report.results[0];
        assert_eq!(result.status(), CaseStatus::Failure);
        assert!(result.judgment().is_none());
        assert!(result.rationale().contains("Timeout"));
        assert_eq!(orchestrator.state(), RunState::Completed);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_keeps_nothing() {
        let mut orchestrator =
            Orchestrator::new(Arc::new(EchoSubject), Arc::new(EchoJudge)).with_settings(quick());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = orchestrator.run(&dsqa_cases(2), &cancel).await.unwrap();
        assert!(report.cancelled);
        assert!(report.results.is_empty());
        assert_eq!(orchestrator.state(), RunState::Idle);
    }
}
