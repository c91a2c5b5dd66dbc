//! Benchmark case definitions and loading

pub mod fixtures;
pub mod loader;
pub mod prompts;

pub use fixtures::builtin_cases;
pub use loader::{load_cases_from_file, load_cases_from_str, validate_cases, LoadError};
pub use prompts::{PromptTemplate, DSQA_PROMPT_TEMPLATE, FACTS_PROMPT_TEMPLATE};

use serde::{Deserialize, Serialize};

/// Benchmark modality a case belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    /// Open-ended reasoning question answering
    #[serde(alias = "dsqa")]
    Dsqa,
    /// Multimodal fact-checking against an image or context
    #[serde(alias = "facts")]
    Facts,
}

impl Modality {
    pub fn all() -> Vec<Modality> {
        vec![Modality::Dsqa, Modality::Facts]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Dsqa => "DSQA",
            Modality::Facts => "FACTS",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Modality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dsqa" | "deepsearchqa" => Ok(Modality::Dsqa),
            "facts" | "facts_multimodal" => Ok(Modality::Facts),
            _ => Err(format!("Unknown modality: {}", s)),
        }
    }
}

/// One evaluation unit: a question, its modality and the atomic facts a
/// correct answer must cover.
///
/// Cases are built once from fixture data and never mutated; fields are only
/// reachable through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkCase {
    id: String,
    #[serde(alias = "type")]
    modality: Modality,
    domain: String,
    question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "image_url", alias = "imageUrl")]
    image_reference: Option<String>,
    #[serde(alias = "groundTruth")]
    ground_truth: Vec<String>,
}

impl BenchmarkCase {
    /// Create a DSQA case
    pub fn dsqa<I, S>(
        id: impl Into<String>,
        domain: impl Into<String>,
        question: impl Into<String>,
        ground_truth: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            modality: Modality::Dsqa,
            domain: domain.into(),
            question: question.into(),
            context: None,
            image_reference: None,
            ground_truth: ground_truth.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a FACTS case
    pub fn facts<I, S>(
        id: impl Into<String>,
        domain: impl Into<String>,
        question: impl Into<String>,
        context: impl Into<String>,
        ground_truth: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            modality: Modality::Facts,
            domain: domain.into(),
            question: question.into(),
            context: Some(context.into()),
            image_reference: None,
            ground_truth: ground_truth.into_iter().map(Into::into).collect(),
        }
    }

    /// Attach an image reference (FACTS only; ignored for DSQA)
    pub fn with_image(mut self, reference: impl Into<String>) -> Self {
        if self.modality == Modality::Facts {
            self.image_reference = Some(reference.into());
        }
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn image_reference(&self) -> Option<&str> {
        self.image_reference.as_deref()
    }

    /// Ground-truth atomic facts, in fixture order
    pub fn ground_truth(&self) -> &[String] {
        &self.ground_truth
    }

    /// Prompt template matching this case's modality
    pub fn template(&self) -> PromptTemplate {
        PromptTemplate::for_modality(self.modality)
    }

    /// Human-readable label used in status messages
    pub fn label(&self) -> String {
        format!("{} ({})", self.id, self.domain)
    }

    /// Drop context/image fields that only FACTS cases may carry
    pub(crate) fn normalized(mut self) -> Self {
        if self.modality == Modality::Dsqa {
            self.context = None;
            self.image_reference = None;
        }
        self
    }
}
