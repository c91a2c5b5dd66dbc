//! Append-only JSON Lines log of evaluation results

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::analysis::EvaluationResult;
use crate::runner::{ProgressSink, RunEvent};

/// Writes each scored case as one JSON line as soon as it is scored, so an
/// interrupted run leaves a readable prefix
pub struct ResultLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl ResultLog {
    /// Create or truncate the log at `path`
    pub fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, result: &EvaluationResult) -> std::io::Result<()> {
        let line = serde_json::to_string(result)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut file = self
            .file
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "result log lock poisoned"))?;
        writeln!(file, "{}", line)?;
        file.flush()
    }
}

impl ProgressSink for ResultLog {
    fn on_event(&self, event: &RunEvent) {
        if let RunEvent::CaseScored(result) = event {
            if let Err(e) = self.append(result) {
                tracing::warn!("Failed to append {} to {}: {}", result.case_id(), self.path.display(), e);
            }
        }
    }
}

/// Read every result from a JSON Lines file, skipping blank lines
pub fn read_results_jsonl(path: impl AsRef<Path>) -> std::io::Result<Vec<EvaluationResult>> {
    let reader = BufReader::new(File::open(path)?);
    let mut results = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let result = serde_json::from_str(&line).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("line {}: {}", number + 1, e),
            )
        })?;
        results.push(result);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{CaseStatus, ScoreSet};
    use crate::cases::BenchmarkCase;

    #[test]
    fn test_log_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("results.jsonl");
        let log = ResultLog::create(&path).unwrap();

        let case = BenchmarkCase::facts("F-1", "Geo", "q", "c", ["x"]);
        let result = EvaluationResult::new(
            &case,
            "{\"error\": \"Connection Failed\"}",
            None,
            ScoreSet::zero(),
            "Judge call failed",
            CaseStatus::Failure,
        );
        log.on_event(&RunEvent::CaseScored(Box::new(result.clone())));
        log.on_event(&RunEvent::Status("ignored".into()));

        let read = read_results_jsonl(&path).unwrap();
        assert_eq!(read, vec![result]);
    }

    #[test]
    fn test_bad_line_reports_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        std::fs::write(&path, "\nnot json\n").unwrap();
        let err = read_results_jsonl(&path).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
