//! Judge output decoding
//!
//! A judge is asked for a bare JSON object in the case's modality schema, but
//! real output arrives wrapped in code fences, with single quotes, trailing
//! commas or numbers encoded as strings. Decoding runs in three stages:
//!
//! 1. strict typed decode of the extracted object,
//! 2. permissive field-by-field extraction from a repaired `serde_json::Value`,
//! 3. a [`JudgmentError`] describing why both failed.
//!
//! Nothing in this module panics on judge input.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cases::{BenchmarkCase, Modality};

/// Why a judge response could not be decoded
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JudgmentError {
    #[error("no JSON object found in judge output")]
    NoObject,

    #[error("malformed JSON: {0}")]
    Malformed(String),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("judgment is for case `{found}`, expected `{expected}`")]
    CaseMismatch { expected: String, found: String },
}

/// One atomic answer in a DSQA judgment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomicAnswer {
    #[serde(rename = "atomic_fact")]
    pub fact: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub step_index: u32,
}

/// One step of a DSQA reasoning chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub step_index: u32,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
}

/// Structured verdict for a DSQA case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DsqaJudgment {
    pub case_id: String,
    pub answers: Vec<AtomicAnswer>,
    #[serde(rename = "chain_of_thought_steps")]
    pub reasoning_steps: Vec<ReasoningStep>,
    #[serde(default)]
    pub overall_confidence: f64,
}

/// Bounding box on the FACTS image
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImageRegion {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub w: f64,
    #[serde(default)]
    pub h: f64,
}

/// A fact the judge found supported by the image or context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedFact {
    #[serde(rename = "atomic_fact")]
    pub fact: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub image_regions: Vec<ImageRegion>,
    #[serde(default)]
    pub evidence: String,
}

/// A claim that conflicts with the ground truth or context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contradiction {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub reason: String,
}

/// Structured verdict for a FACTS case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactsJudgment {
    pub case_id: String,
    #[serde(rename = "matched_atomic_facts")]
    pub matched_facts: Vec<MatchedFact>,
    pub contradictions: Vec<Contradiction>,
    #[serde(default)]
    pub rubric_score: f64,
    #[serde(default)]
    pub overall_confidence: f64,
}

/// A decoded judgment, one variant per modality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "modality")]
pub enum Judgment {
    #[serde(rename = "DSQA")]
    Dsqa(DsqaJudgment),
    #[serde(rename = "FACTS")]
    Facts(FactsJudgment),
}

impl Judgment {
    pub fn modality(&self) -> Modality {
        match self {
            Judgment::Dsqa(_) => Modality::Dsqa,
            Judgment::Facts(_) => Modality::Facts,
        }
    }

    pub fn case_id(&self) -> &str {
        match self {
            Judgment::Dsqa(j) => &j.case_id,
            Judgment::Facts(j) => &j.case_id,
        }
    }

    /// Fact texts the judgment asserts
    pub fn asserted_facts(&self) -> Vec<&str> {
        match self {
            Judgment::Dsqa(j) => j.answers.iter().map(|a| a.fact.as_str()).collect(),
            Judgment::Facts(j) => j.matched_facts.iter().map(|f| f.fact.as_str()).collect(),
        }
    }

    pub fn overall_confidence(&self) -> f64 {
        match self {
            Judgment::Dsqa(j) => j.overall_confidence,
            Judgment::Facts(j) => j.overall_confidence,
        }
    }

    /// Clamp every confidence and score into [0, 1], mapping non-finite values to 0
    fn sanitized(self) -> Self {
        match self {
            Judgment::Dsqa(mut j) => {
                j.overall_confidence = unit(j.overall_confidence);
                for answer in &mut j.answers {
                    answer.confidence = unit(answer.confidence);
                }
                for step in &mut j.reasoning_steps {
                    step.confidence = unit(step.confidence);
                }
                Judgment::Dsqa(j)
            }
            Judgment::Facts(mut j) => {
                j.overall_confidence = unit(j.overall_confidence);
                j.rubric_score = unit(j.rubric_score);
                for fact in &mut j.matched_facts {
                    fact.confidence = unit(fact.confidence);
                }
                Judgment::Facts(j)
            }
        }
    }
}

fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Decode a judge's raw response for `case`.
///
/// The schema is picked from the case's modality and the judgment's
/// `case_id` must name the case.
pub fn parse_judgment(raw: &str, case: &BenchmarkCase) -> Result<Judgment, JudgmentError> {
    let object = extract_object(raw).ok_or(JudgmentError::NoObject)?;

    let judgment = match decode_strict(object, case.modality()) {
        Ok(judgment) => judgment,
        Err(strict_error) => {
            tracing::debug!(
                "Strict decode failed for {}: {}; trying permissive extraction",
                case.id(),
                strict_error
            );
            let value = parse_value(object).ok_or(JudgmentError::Malformed(strict_error))?;
            decode_permissive(&value, case.modality())?
        }
    };

    let found = judgment.case_id().trim();
    if !found.eq_ignore_ascii_case(case.id().trim()) {
        return Err(JudgmentError::CaseMismatch {
            expected: case.id().to_string(),
            found: found.to_string(),
        });
    }

    Ok(judgment.sanitized())
}

/// Best-effort extraction of the first JSON object in `raw` as a `Value`
pub fn extract_json_value(raw: &str) -> Option<Value> {
    extract_object(raw).and_then(parse_value)
}

fn decode_strict(object: &str, modality: Modality) -> Result<Judgment, String> {
    match modality {
        Modality::Dsqa => serde_json::from_str::<DsqaJudgment>(object)
            .map(Judgment::Dsqa)
            .map_err(|e| e.to_string()),
        Modality::Facts => serde_json::from_str::<FactsJudgment>(object)
            .map(Judgment::Facts)
            .map_err(|e| e.to_string()),
    }
}

fn parse_value(object: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(object) {
        return Some(value);
    }
    let repaired = strip_trailing_commas(&normalize_quotes(object));
    serde_json::from_str(&repaired).ok()
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("valid fence regex"))
}

fn trailing_comma_regex() -> &'static Regex {
    static TRAILING: OnceLock<Regex> = OnceLock::new();
    TRAILING.get_or_init(|| Regex::new(r",(\s*[}\]])").expect("valid trailing comma regex"))
}

/// Slice out the first balanced `{...}` in `raw`, preferring fenced content.
///
/// An object that never closes is returned to the end of input so the
/// decoder can report it as malformed.
fn extract_object(raw: &str) -> Option<&str> {
    let body = fence_regex()
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|s| s.contains('{'))
        .unwrap_or(raw);

    let start = body.find('{')?;
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (offset, ch) in body[start..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&body[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    Some(&body[start..])
}

/// Rewrite single-quoted strings as double-quoted JSON strings
fn normalize_quotes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for ch in input.chars() {
        match quote {
            None => {
                if ch == '"' || ch == '\'' {
                    quote = Some(ch);
                    out.push('"');
                } else {
                    out.push(ch);
                }
            }
            Some(q) => {
                if escaped {
                    escaped = false;
                    if q == '\'' && ch == '\'' {
                        // \' is not a JSON escape
                        out.pop();
                    }
                    out.push(ch);
                } else if ch == '\\' {
                    escaped = true;
                    out.push(ch);
                } else if ch == q {
                    quote = None;
                    out.push('"');
                } else if ch == '"' && q == '\'' {
                    out.push_str("\\\"");
                } else {
                    out.push(ch);
                }
            }
        }
    }
    out
}

fn strip_trailing_commas(input: &str) -> String {
    trailing_comma_regex().replace_all(input, "$1").into_owned()
}

// ── Permissive extraction ──────────────────────────────────────────────────

fn decode_permissive(value: &Value, modality: Modality) -> Result<Judgment, JudgmentError> {
    let root = value.as_object().ok_or(JudgmentError::WrongType {
        field: "judgment",
        expected: "a JSON object",
    })?;

    let case_id = required_string(root, "case_id", &["case_id", "caseId", "id"])?;

    match modality {
        Modality::Dsqa => {
            let answers = required_array(root, "answers", &["answers", "atomic_answers", "atomicAnswers"])?
                .iter()
                .enumerate()
                .filter_map(|(i, item)| lenient_answer(item, i))
                .collect();
            let reasoning_steps = required_array(
                root,
                "chain_of_thought_steps",
                &["chain_of_thought_steps", "reasoning_steps", "reasoningSteps", "steps"],
            )?
            .iter()
            .filter_map(lenient_step)
            .collect();

            Ok(Judgment::Dsqa(DsqaJudgment {
                case_id,
                answers,
                reasoning_steps,
                overall_confidence: number_field(root, &["overall_confidence", "overallConfidence"]),
            }))
        }
        Modality::Facts => {
            let matched_facts = required_array(
                root,
                "matched_atomic_facts",
                &["matched_atomic_facts", "matched_facts", "matchedFacts"],
            )?
            .iter()
            .filter_map(lenient_matched_fact)
            .collect();
            let contradictions = required_array(root, "contradictions", &["contradictions"])?
                .iter()
                .filter_map(lenient_contradiction)
                .collect();

            Ok(Judgment::Facts(FactsJudgment {
                case_id,
                matched_facts,
                contradictions,
                rubric_score: number_field(root, &["rubric_score", "rubricScore"]),
                overall_confidence: number_field(root, &["overall_confidence", "overallConfidence"]),
            }))
        }
    }
}

fn lookup<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k)).filter(|v| !v.is_null())
}

fn required_string(
    obj: &Map<String, Value>,
    field: &'static str,
    keys: &[&str],
) -> Result<String, JudgmentError> {
    match lookup(obj, keys) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(_) => Err(JudgmentError::WrongType {
            field,
            expected: "a string",
        }),
        None => Err(JudgmentError::MissingField(field)),
    }
}

fn required_array<'a>(
    obj: &'a Map<String, Value>,
    field: &'static str,
    keys: &[&str],
) -> Result<&'a Vec<Value>, JudgmentError> {
    match lookup(obj, keys) {
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(JudgmentError::WrongType {
            field,
            expected: "an array",
        }),
        None => Err(JudgmentError::MissingField(field)),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_suffix('%') {
                Some(pct) => pct.trim().parse::<f64>().ok().map(|p| p / 100.0),
                None => s.parse::<f64>().ok(),
            }
        }
        _ => None,
    }
}

fn number_field(obj: &Map<String, Value>, keys: &[&str]) -> f64 {
    lookup(obj, keys).and_then(as_number).unwrap_or(0.0)
}

fn index_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<u32> {
    lookup(obj, keys)
        .and_then(as_number)
        .filter(|n| *n >= 0.0 && n.fract() == 0.0 && *n <= u32::MAX as f64)
        .map(|n| n as u32)
}

fn text_field(obj: &Map<String, Value>, keys: &[&str]) -> String {
    match lookup(obj, keys) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn string_list(obj: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    match lookup(obj, keys) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn lenient_answer(item: &Value, position: usize) -> Option<AtomicAnswer> {
    match item {
        Value::String(fact) => Some(AtomicAnswer {
            fact: fact.clone(),
            confidence: 0.0,
            evidence: Vec::new(),
            step_index: position as u32 + 1,
        }),
        Value::Object(obj) => Some(AtomicAnswer {
            fact: text_field(obj, &["atomic_fact", "fact", "text", "answer"]),
            confidence: number_field(obj, &["confidence"]),
            evidence: string_list(obj, &["evidence", "sources"]),
            step_index: index_field(obj, &["step_index", "stepIndex", "step"]).unwrap_or(0),
        }),
        _ => None,
    }
}

fn lenient_step(item: &Value) -> Option<ReasoningStep> {
    let obj = item.as_object()?;
    Some(ReasoningStep {
        step_index: index_field(obj, &["step_index", "stepIndex", "step"]).unwrap_or(0),
        text: text_field(obj, &["text", "thought"]),
        sources: string_list(obj, &["sources", "evidence"]),
        confidence: number_field(obj, &["confidence"]),
    })
}

fn lenient_matched_fact(item: &Value) -> Option<MatchedFact> {
    match item {
        Value::String(fact) => Some(MatchedFact {
            fact: fact.clone(),
            confidence: 0.0,
            image_regions: Vec::new(),
            evidence: String::new(),
        }),
        Value::Object(obj) => {
            let image_regions = match lookup(obj, &["image_regions", "imageRegions", "regions"]) {
                Some(Value::Array(regions)) => regions
                    .iter()
                    .filter_map(|r| r.as_object())
                    .map(|r| ImageRegion {
                        x: number_field(r, &["x"]),
                        y: number_field(r, &["y"]),
                        w: number_field(r, &["w", "width"]),
                        h: number_field(r, &["h", "height"]),
                    })
                    .collect(),
                _ => Vec::new(),
            };
            let evidence = match lookup(obj, &["evidence"]) {
                Some(Value::Array(_)) => string_list(obj, &["evidence"]).join("; "),
                _ => text_field(obj, &["evidence"]),
            };
            Some(MatchedFact {
                fact: text_field(obj, &["atomic_fact", "fact", "text"]),
                confidence: number_field(obj, &["confidence"]),
                image_regions,
                evidence,
            })
        }
        _ => None,
    }
}

fn lenient_contradiction(item: &Value) -> Option<Contradiction> {
    match item {
        Value::String(text) => Some(Contradiction {
            text: text.clone(),
            reason: String::new(),
        }),
        Value::Object(obj) => Some(Contradiction {
            text: text_field(obj, &["text", "claim"]),
            reason: text_field(obj, &["reason", "explanation"]),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dsqa_case() -> BenchmarkCase {
        BenchmarkCase::dsqa("DSQA-001", "Physics", "q", ["A", "B", "C"])
    }

    fn facts_case() -> BenchmarkCase {
        BenchmarkCase::facts("FACTS-001", "Geo", "q", "ctx", ["X", "Y"])
    }

    #[test]
    fn test_strict_dsqa() {
        let raw = r#"{
            "case_id": "DSQA-001",
            "answers": [{"atomic_fact": "A", "confidence": 0.9, "evidence": ["e1"], "step_index": 1}],
            "chain_of_thought_steps": [{"step_index": 1, "text": "t", "sources": ["s"], "confidence": 0.8}],
            "overall_confidence": 0.7
        }"#;

        let judgment = parse_judgment(raw, &dsqa_case()).unwrap();
        let Judgment::Dsqa(j) = judgment else { panic!("expected DSQA") };
        assert_eq!(j.answers[0].fact, "A");
        assert_eq!(j.reasoning_steps[0].sources, vec!["s".to_string()]);
        assert_eq!(j.overall_confidence, 0.7);
    }

    #[test]
    fn test_missing_overall_confidence_defaults_to_zero() {
        let raw = r#"{"case_id": "DSQA-001", "answers": [], "chain_of_thought_steps": []}"#;
        let judgment = parse_judgment(raw, &dsqa_case()).unwrap();
        assert_eq!(judgment.overall_confidence(), 0.0);
    }

    #[test]
    fn test_fenced_single_quoted_output() {
        let raw = "Sure, here it is:\n```json\n{\n 'case_id':'FACTS-001',\n 'matched_atomic_facts':[{'atomic_fact':'X','confidence':'0.8','evidence':['seen']}],\n 'contradictions':[{'text':'Z','reason':'not in image'},],\n 'rubric_score':0.75\n}\n```";

        let judgment = parse_judgment(raw, &facts_case()).unwrap();
        let Judgment::Facts(j) = judgment else { panic!("expected FACTS") };
        assert_eq!(j.matched_facts[0].fact, "X");
        assert!((j.matched_facts[0].confidence - 0.8).abs() < 1e-9);
        assert_eq!(j.matched_facts[0].evidence, "seen");
        assert_eq!(j.contradictions.len(), 1);
        assert_eq!(j.rubric_score, 0.75);
        assert_eq!(j.overall_confidence, 0.0);
    }

    #[test]
    fn test_permissive_coerces_strings_and_aliases() {
        let raw = r#"{
            "caseId": "DSQA-001",
            "answers": ["A", {"fact": "B", "confidence": "90%", "evidence": "one source", "step_index": "2"}],
            "reasoningSteps": [{"stepIndex": "1", "text": "t", "sources": "s"}],
            "overall_confidence": "0.5"
        }"#;

        let Judgment::Dsqa(j) = parse_judgment(raw, &dsqa_case()).unwrap() else {
            panic!("expected DSQA")
        };
        assert_eq!(j.answers.len(), 2);
        assert_eq!(j.answers[0].step_index, 1);
        assert!((j.answers[1].confidence - 0.9).abs() < 1e-9);
        assert_eq!(j.answers[1].evidence, vec!["one source".to_string()]);
        assert_eq!(j.answers[1].step_index, 2);
        assert_eq!(j.reasoning_steps[0].step_index, 1);
        assert_eq!(j.overall_confidence, 0.5);
    }

    #[test]
    fn test_missing_list_field_fails() {
        let raw = r#"{"case_id": "DSQA-001", "answers": []}"#;
        assert_eq!(
            parse_judgment(raw, &dsqa_case()),
            Err(JudgmentError::MissingField("chain_of_thought_steps"))
        );
    }

    #[test]
    fn test_missing_case_id_fails() {
        let raw = r#"{"error": "Connection Failed"}"#;
        assert_eq!(
            parse_judgment(raw, &facts_case()),
            Err(JudgmentError::MissingField("case_id"))
        );
    }

    #[test]
    fn test_list_of_wrong_type_fails() {
        let raw = r#"{"case_id": "FACTS-001", "matched_atomic_facts": "X", "contradictions": []}"#;
        assert!(matches!(
            parse_judgment(raw, &facts_case()),
            Err(JudgmentError::WrongType { field: "matched_atomic_facts", .. })
        ));
    }

    #[test]
    fn test_garbage_input() {
        assert_eq!(parse_judgment("", &dsqa_case()), Err(JudgmentError::NoObject));
        assert_eq!(
            parse_judgment("I cannot evaluate this.", &dsqa_case()),
            Err(JudgmentError::NoObject)
        );
        assert!(matches!(
            parse_judgment("{\"case_id\": \"DSQA-001\", \"answers\": [", &dsqa_case()),
            Err(JudgmentError::Malformed(_))
        ));
    }

    #[test]
    fn test_case_mismatch() {
        let raw = r#"{"case_id": "DSQA-999", "answers": [], "chain_of_thought_steps": []}"#;
        assert!(matches!(
            parse_judgment(raw, &dsqa_case()),
            Err(JudgmentError::CaseMismatch { .. })
        ));
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let raw = r#"{"case_id": "FACTS-001", "matched_atomic_facts": [{"atomic_fact": "X", "confidence": 7}], "contradictions": [], "rubric_score": -2}"#;
        let Judgment::Facts(j) = parse_judgment(raw, &facts_case()).unwrap() else {
            panic!("expected FACTS")
        };
        assert_eq!(j.matched_facts[0].confidence, 1.0);
        assert_eq!(j.rubric_score, 0.0);
    }

    #[test]
    fn test_extract_object_ignores_braces_in_strings() {
        let raw = r#"prefix {"a": "}{", "b": {"c": 1}} suffix {"d": 2}"#;
        assert_eq!(extract_object(raw), Some(r#"{"a": "}{", "b": {"c": 1}}"#));
    }

    #[test]
    fn test_extract_json_value_reads_rationale() {
        let raw = "```\n{'case_id': 'A', 'rationale': 'covers two facts'}\n```";
        let value = extract_json_value(raw).unwrap();
        assert_eq!(value["rationale"], "covers two facts");
    }

    #[test]
    fn test_judgment_serde_is_tagged_by_modality() {
        let judgment = Judgment::Facts(FactsJudgment {
            case_id: "F".into(),
            matched_facts: vec![],
            contradictions: vec![],
            rubric_score: 0.5,
            overall_confidence: 0.5,
        });
        let json = serde_json::to_value(&judgment).unwrap();
        assert_eq!(json["modality"], "FACTS");
        let back: Judgment = serde_json::from_value(json).unwrap();
        assert_eq!(back, judgment);
    }
}
