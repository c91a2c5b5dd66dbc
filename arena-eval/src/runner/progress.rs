//! Run events and the sinks that consume them

use tokio::sync::mpsc;

use crate::analysis::{AggregateMetrics, EvaluationResult};

/// Something that happened during a run, in emission order
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Started {
        run_id: String,
        total_cases: usize,
    },
    /// Human-readable status line for the current step
    Status(String),
    CaseScored(Box<EvaluationResult>),
    Metrics(AggregateMetrics),
    /// Percentage of cases finished, 0-100 and never decreasing within a run
    Progress {
        completed: usize,
        total: usize,
        percent: f64,
    },
    Completed(AggregateMetrics),
    Cancelled {
        completed: usize,
    },
    Failed(String),
}

/// Fire-and-forget consumer of run events
pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: &RunEvent);
}

/// Default no-op sink
pub struct NoOpProgress;

impl ProgressSink for NoOpProgress {
    fn on_event(&self, _event: &RunEvent) {}
}

/// Console sink printing one line per case
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn on_event(&self, event: &RunEvent) {
        match event {
            RunEvent::Started { run_id, total_cases } => {
                println!("Run {} started: {} cases", run_id, total_cases);
            }
            RunEvent::Status(line) => println!("  {}", line),
            RunEvent::CaseScored(result) => {
                let scores = result.scores();
                println!(
                    "  {} {} [{}] F1 {:.2} | rubric {:.2} | penalty {:.2}",
                    result.status(),
                    result.case_id(),
                    result.modality(),
                    scores.f1_score,
                    scores.rubric_score,
                    scores.contradiction_penalty
                );
            }
            RunEvent::Metrics(_) => {}
            RunEvent::Progress {
                completed,
                total,
                percent,
            } => {
                println!("Progress: {}/{} cases complete ({:.0}%)", completed, total, percent);
            }
            RunEvent::Completed(metrics) => {
                println!(
                    "Evaluation complete. Composite score {:.1}",
                    metrics.composite_score
                );
            }
            RunEvent::Cancelled { completed } => {
                println!("Run cancelled after {} cases", completed);
            }
            RunEvent::Failed(reason) => println!("Run failed: {}", reason),
        }
    }
}

/// Forwards events into a channel; a dropped receiver is ignored
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<RunEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<RunEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelSink {
    fn on_event(&self, event: &RunEvent) {
        let _ = self.tx.send(event.clone());
    }
}
