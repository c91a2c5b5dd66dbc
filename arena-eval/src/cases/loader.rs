//! Case loading from JSON dataset files

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use super::BenchmarkCase;

/// Error type for case loading
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Case {index} has an empty id")]
    EmptyId { index: usize },

    #[error("Duplicate case id: {0}")]
    DuplicateId(String),
}

/// Top-level dataset file
#[derive(Debug, Deserialize)]
struct DatasetFile {
    #[allow(dead_code)]
    #[serde(default)]
    version: Option<String>,
    #[allow(dead_code)]
    #[serde(default)]
    description: Option<String>,
    cases: Vec<BenchmarkCase>,
}

/// Load cases from a JSON dataset file
pub fn load_cases_from_file(path: impl AsRef<Path>) -> Result<Vec<BenchmarkCase>, LoadError> {
    let content = std::fs::read_to_string(path.as_ref())?;
    load_cases_from_str(&content)
}

/// Load cases from a JSON string.
///
/// Accepts either `{"cases": [...]}` or a bare array of cases. The returned
/// cases keep file order and are checked with [`validate_cases`].
pub fn load_cases_from_str(content: &str) -> Result<Vec<BenchmarkCase>, LoadError> {
    let trimmed = content.trim_start();
    let cases: Vec<BenchmarkCase> = if trimmed.starts_with('[') {
        serde_json::from_str(content)
            .map_err(|e| LoadError::Parse(format!("JSON parse error: {}", e)))?
    } else {
        let file: DatasetFile = serde_json::from_str(content)
            .map_err(|e| LoadError::Parse(format!("JSON parse error: {}", e)))?;
        file.cases
    };

    let cases: Vec<BenchmarkCase> = cases.into_iter().map(BenchmarkCase::normalized).collect();
    validate_cases(&cases)?;
    Ok(cases)
}

/// Check that every case has a non-blank, unique id
pub fn validate_cases(cases: &[BenchmarkCase]) -> Result<(), LoadError> {
    let mut seen = HashSet::new();
    for (index, case) in cases.iter().enumerate() {
        if case.id().trim().is_empty() {
            return Err(LoadError::EmptyId { index });
        }
        if !seen.insert(case.id()) {
            return Err(LoadError::DuplicateId(case.id().to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases::Modality;
    use std::io::Write;

    #[test]
    fn test_load_dataset_object() {
        let json = r#"{
            "version": "1.0",
            "cases": [
                {
                    "id": "DSQA-100",
                    "modality": "DSQA",
                    "domain": "Physics",
                    "question": "Why is the sky blue?",
                    "ground_truth": ["Rayleigh scattering", "Shorter wavelengths scatter more"]
                },
                {
                    "id": "FACTS-100",
                    "type": "facts",
                    "domain": "Geography",
                    "question": "What is shown?",
                    "context": "A desert at noon.",
                    "imageUrl": "https://example.com/desert.png",
                    "groundTruth": ["Arid climate"]
                }
            ]
        }"#;

        let cases = load_cases_from_str(json).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].modality(), Modality::Dsqa);
        assert_eq!(cases[0].ground_truth().len(), 2);
        assert_eq!(cases[1].modality(), Modality::Facts);
        assert_eq!(cases[1].image_reference(), Some("https://example.com/desert.png"));
        assert_eq!(cases[1].ground_truth(), &["Arid climate".to_string()]);
    }

    #[test]
    fn test_load_bare_array_strips_context_from_dsqa() {
        let json = r#"[{
            "id": "D-1",
            "modality": "DSQA",
            "domain": "History",
            "question": "q",
            "context": "should be dropped",
            "ground_truth": []
        }]"#;

        let cases = load_cases_from_str(json).unwrap();
        assert!(cases[0].context().is_none());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let json = r#"{"cases": [
            {"id": "X", "modality": "DSQA", "domain": "d", "question": "q", "ground_truth": []},
            {"id": "X", "modality": "DSQA", "domain": "d", "question": "q", "ground_truth": []}
        ]}"#;

        assert!(matches!(load_cases_from_str(json), Err(LoadError::DuplicateId(id)) if id == "X"));
    }

    #[test]
    fn test_blank_id_rejected() {
        let json = r#"[{"id": "  ", "modality": "DSQA", "domain": "d", "question": "q", "ground_truth": []}]"#;
        assert!(matches!(load_cases_from_str(json), Err(LoadError::EmptyId { index: 0 })));
    }

    #[test]
    fn test_missing_ground_truth_is_parse_error() {
        let json = r#"[{"id": "A", "modality": "DSQA", "domain": "d", "question": "q"}]"#;
        assert!(matches!(load_cases_from_str(json), Err(LoadError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"cases": [{{"id": "A", "modality": "FACTS", "domain": "d", "question": "q", "context": "c", "ground_truth": ["x"]}}]}}"#
        )
        .unwrap();

        let cases = load_cases_from_file(file.path()).unwrap();
        assert_eq!(cases[0].context(), Some("c"));
    }
}
