//! Semantic overlap strategy - lexical similarity against category labels
//!
//! Scores token overlap between record text and each candidate label, picks
//! the best candidate above the acceptance threshold, then applies the
//! direction-substitution table so near-miss labels land on real categories.

use std::collections::HashSet;

use crate::categorize::categories::{AE3_CATEGORIES, AE3_SUBSTITUTIONS, UNCATEGORIZED};
use crate::categorize::CategoryStrategy;
use crate::record::CategorizationResult;

const STOPWORDS: &[&str] = &["the", "a", "an", "of", "at", "in", "on", "and", "or", "for"];

pub struct SemanticOverlapStrategy {
    name: &'static str,
    categories: &'static [&'static str],
    substitutions: &'static [(&'static str, &'static str)],
    /// Candidate label and its token set (real categories plus substitution keys)
    candidates: Vec<(&'static str, Vec<String>)>,
    pub threshold: f64,
}

impl SemanticOverlapStrategy {
    /// Strategy for the excavating company.
    pub fn ae3(threshold: f64) -> Self {
        Self::new(
            "semantic_overlap",
            AE3_CATEGORIES,
            AE3_SUBSTITUTIONS,
            threshold,
        )
    }

    pub fn new(
        name: &'static str,
        categories: &'static [&'static str],
        substitutions: &'static [(&'static str, &'static str)],
        threshold: f64,
    ) -> Self {
        let candidates = categories
            .iter()
            .filter(|c| **c != "Miscellaneous")
            .copied()
            .chain(substitutions.iter().map(|(alias, _)| *alias))
            .map(|label| (label, tokenize(label)))
            .filter(|(_, tokens)| !tokens.is_empty())
            .collect();
        Self {
            name,
            categories,
            substitutions,
            candidates,
            threshold,
        }
    }

    fn substitute(&self, label: &'static str) -> &'static str {
        self.substitutions
            .iter()
            .find(|(alias, _)| *alias == label)
            .map(|(_, target)| *target)
            .unwrap_or(label)
    }
}

impl CategoryStrategy for SemanticOverlapStrategy {
    fn name(&self) -> &str {
        self.name
    }

    fn categories(&self) -> &[&'static str] {
        self.categories
    }

    fn categorize(&self, text: &str) -> CategorizationResult {
        let text_tokens: HashSet<String> = tokenize(text).into_iter().collect();

        let mut best: Option<(&'static str, f64)> = None;
        for &(label, ref label_tokens) in &self.candidates {
            let hits = label_tokens
                .iter()
                .filter(|t| text_tokens.contains(*t))
                .count();
            let score = hits as f64 / label_tokens.len() as f64;
            if score < self.threshold {
                continue;
            }
            best = match best {
                None => Some((label, score)),
                Some((current, current_score)) => {
                    if score > current_score || (score == current_score && label < current) {
                        Some((label, score))
                    } else {
                        Some((current, current_score))
                    }
                }
            };
        }

        match best {
            Some((label, score)) => CategorizationResult {
                category_label: self.substitute(label).to_string(),
                strategy_used: self.name.to_string(),
                match_score: Some(score),
            },
            None => CategorizationResult {
                category_label: UNCATEGORIZED.to_string(),
                strategy_used: self.name.to_string(),
                match_score: None,
            },
        }
    }
}

/// Lowercase alphanumeric tokens with a light suffix stem, so "excavating"
/// and "excavation" compare equal.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty() && !STOPWORDS.contains(t))
        .map(stem)
        .collect()
}

fn stem(token: &str) -> String {
    for suffix in ["ing", "ion", "ed", "s"] {
        if token.len() > suffix.len() + 3 {
            if let Some(stripped) = token.strip_suffix(suffix) {
                return stripped.to_string();
            }
        }
    }
    token.to_string()
}
