//! Matching asserted facts against ground-truth phrasing

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Rule deciding whether an asserted fact states a ground-truth fact.
///
/// Every policy first normalizes both sides: lowercase, punctuation folded to
/// spaces, whitespace collapsed. Blank text never matches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Byte-for-byte equality of the raw strings
    Exact,
    /// Equality after normalization
    Normalized,
    /// The asserted fact contains the whole ground-truth phrase on word
    /// boundaries; a fragment of the truth does not match
    Containment,
    /// Jaccard overlap of normalized word sets at or above `threshold`
    TokenOverlap { threshold: f64 },
}

impl Default for MatchPolicy {
    fn default() -> Self {
        MatchPolicy::Containment
    }
}

impl MatchPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            MatchPolicy::Exact => "exact",
            MatchPolicy::Normalized => "normalized",
            MatchPolicy::Containment => "containment",
            MatchPolicy::TokenOverlap { .. } => "token_overlap",
        }
    }
}

impl std::str::FromStr for MatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        if let Some(threshold) = lower.strip_prefix("token_overlap:") {
            let threshold: f64 = threshold
                .parse()
                .map_err(|_| format!("Invalid overlap threshold: {}", threshold))?;
            return Ok(MatchPolicy::TokenOverlap { threshold });
        }
        match lower.as_str() {
            "exact" => Ok(MatchPolicy::Exact),
            "normalized" | "case_insensitive" => Ok(MatchPolicy::Normalized),
            "containment" | "contains" => Ok(MatchPolicy::Containment),
            "token_overlap" => Ok(MatchPolicy::TokenOverlap { threshold: 0.5 }),
            _ => Err(format!("Unknown match policy: {}", s)),
        }
    }
}

/// Pluggable fact comparison
pub trait FactMatcher: Send + Sync {
    fn matches(&self, asserted: &str, truth: &str) -> bool;
}

impl FactMatcher for MatchPolicy {
    fn matches(&self, asserted: &str, truth: &str) -> bool {
        if let MatchPolicy::Exact = self {
            return !truth.trim().is_empty() && asserted == truth;
        }

        let a = normalize(asserted);
        let t = normalize(truth);
        if a.is_empty() || t.is_empty() {
            return false;
        }

        match self {
            MatchPolicy::Exact | MatchPolicy::Normalized => a == t,
            MatchPolicy::Containment => contains_phrase(&a, &t),
            MatchPolicy::TokenOverlap { threshold } => jaccard(&a, &t) >= *threshold,
        }
    }
}

/// Lowercase, fold punctuation to spaces and collapse whitespace
pub fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whole-word containment: `needle` appears in `haystack` on word boundaries
fn contains_phrase(haystack: &str, needle: &str) -> bool {
    let padded_haystack = format!(" {} ", haystack);
    let padded_needle = format!(" {} ", needle);
    padded_haystack.contains(&padded_needle)
}

fn jaccard(a: &str, b: &str) -> f64 {
    let left: HashSet<&str> = a.split_whitespace().collect();
    let right: HashSet<&str> = b.split_whitespace().collect();
    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    left.intersection(&right).count() as f64 / union as f64
}
