//! Prompt templates for subject and judge calls

use super::{BenchmarkCase, Modality};

/// Subject prompt for DSQA cases
pub const DSQA_PROMPT_TEMPLATE: &str = r#"You are a research agent. Return ONLY valid JSON:
{
 "case_id": "{{CASE_ID}}",
 "answers": [{"atomic_fact": "", "confidence": 0.0, "evidence": ["..."], "step_index": 1}],
 "chain_of_thought_steps": [{"step_index": 1, "text": "", "sources": [""], "confidence": 0.0}],
 "overall_confidence": 0.0
}
Confidence values are numbers between 0 and 1. No text outside JSON.

Question: {{QUESTION}}"#;

/// Subject prompt for FACTS cases
pub const FACTS_PROMPT_TEMPLATE: &str = r#"You are a multimodal fact-checker. Return ONLY valid JSON:
{
 "case_id": "{{CASE_ID}}",
 "matched_atomic_facts": [{"atomic_fact": "", "confidence": 0.0, "image_regions": [{"x": 0, "y": 0, "w": 0, "h": 0}], "evidence": ""}],
 "contradictions": [{"text": "", "reason": ""}],
 "rubric_score": 0.0,
 "overall_confidence": 0.0
}
Scores and confidence values are numbers between 0 and 1. No extra text outside JSON.

Task: Evaluate the provided image/context against known facts.
Context: {{CONTEXT}}"#;

const JUDGE_PREAMBLE: &str = "You are an impartial evaluator. Compare the candidate response below with the \
ground-truth atomic facts for the benchmark case. Restate only the facts the candidate actually \
supports, using the ground-truth phrasing where a candidate fact matches one. Keep the candidate's \
reasoning steps and sources as given. List any claim that contradicts the ground truth or the \
context under \"contradictions\".";

/// A modality-specific prompt with `{{CASE_ID}}`, `{{QUESTION}}` and
/// `{{CONTEXT}}` placeholders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    modality: Modality,
    text: &'static str,
}

impl PromptTemplate {
    pub fn for_modality(modality: Modality) -> Self {
        let text = match modality {
            Modality::Dsqa => DSQA_PROMPT_TEMPLATE,
            Modality::Facts => FACTS_PROMPT_TEMPLATE,
        };
        Self { modality, text }
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    /// Raw template text with placeholders intact
    pub fn text(&self) -> &'static str {
        self.text
    }

    /// Substitute the case's fields into the template
    pub fn render(&self, case: &BenchmarkCase) -> String {
        self.text
            .replace("{{CASE_ID}}", case.id())
            .replace("{{QUESTION}}", case.question())
            .replace("{{CONTEXT}}", &render_context(case))
    }

    /// The JSON object shape a response must follow, taken from the template
    pub fn schema(&self) -> &'static str {
        // The object closes on its own line; placeholders after it also use braces.
        let start = self.text.find('{').unwrap_or(0);
        let end = self.text.find("\n}").map(|i| i + 2).unwrap_or(self.text.len());
        &self.text[start..end]
    }
}

/// FACTS context block: the textual context, the question, and the image
/// reference when present
fn render_context(case: &BenchmarkCase) -> String {
    let mut out = case.context().unwrap_or_default().to_string();
    if case.modality() == Modality::Facts && !case.question().is_empty() {
        out.push_str("\nQuestion: ");
        out.push_str(case.question());
    }
    if let Some(image) = case.image_reference() {
        out.push_str("\nImage: ");
        out.push_str(image);
    }
    out
}

/// Build the judge prompt for a case and the subject's raw output.
///
/// The judge answers in the same schema as the subject, with an added
/// `rationale` string.
pub fn render_judge_prompt(case: &BenchmarkCase, candidate_output: &str) -> String {
    let template = case.template();
    let ground_truth = case
        .ground_truth()
        .iter()
        .map(|fact| format!("- {}", fact))
        .collect::<Vec<_>>()
        .join("\n");

    let schema = template.schema().replace("{{CASE_ID}}", case.id());
    let schema = match schema.rfind('}') {
        Some(end) => format!(
            "{},\n \"rationale\": \"\"\n}}",
            schema[..end].trim_end()
        ),
        None => schema,
    };

    let mut prompt = format!(
        "{}\n\nCase: {}\nModality: {}\nDomain: {}\nQuestion: {}\n",
        JUDGE_PREAMBLE,
        case.id(),
        case.modality(),
        case.domain(),
        case.question()
    );
    if let Some(context) = case.context() {
        prompt.push_str(&format!("Context: {}\n", context));
    }
    if let Some(image) = case.image_reference() {
        prompt.push_str(&format!("Image: {}\n", image));
    }
    prompt.push_str(&format!(
        "\nGround-truth atomic facts:\n{}\n\nCandidate response:\n{}\n\n\
         Return ONLY valid JSON of this shape, no text outside JSON:\n{}",
        ground_truth, candidate_output, schema
    ));
    prompt
}
