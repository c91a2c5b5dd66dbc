//! Evaluation run engine

pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod rate_limiter;

pub use models::{
    EchoJudge, Judge, JudgeVerdict, LlmJudge, LlmSubject, SubjectModel, SUBJECT_FAILURE_SENTINEL,
};
pub use orchestrator::{Orchestrator, RunError, RunHandle, RunReport, RunSettings, RunState};
pub use progress::{ChannelSink, ConsoleProgress, NoOpProgress, ProgressSink, RunEvent};
pub use rate_limiter::RateLimiter;
