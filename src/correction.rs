//! Name Correction Engine - resolves raw entity strings against the registry
//!
//! Resolution order: exact registry hit, then fuzzy scan over the registry
//! keys for that kind, then pass-through. `resolve` never fails on malformed
//! input; empty and "N/A" names yield a sentinel result.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strsim::{jaro_winkler, normalized_levenshtein};
use tracing::debug;

use crate::normalize;
use crate::record::{CorrectionResult, MatchMethod};
use crate::registry::{normalize_key, CanonicalRegistry, EntityKind};

/// Similarity backend for the fuzzy stage
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityAlgorithm {
    /// Jaro-Winkler, weighted toward shared prefixes. Good for typos in names.
    #[default]
    JaroWinkler,
    /// Normalized Levenshtein edit distance.
    Levenshtein,
}

impl SimilarityAlgorithm {
    pub fn score(&self, a: &str, b: &str) -> f64 {
        match self {
            SimilarityAlgorithm::JaroWinkler => jaro_winkler(a, b),
            SimilarityAlgorithm::Levenshtein => normalized_levenshtein(a, b),
        }
    }
}

/// Resolves raw names to canonical names using an immutable registry snapshot.
#[derive(Clone)]
pub struct NameCorrector {
    registry: Arc<CanonicalRegistry>,
    /// Minimum similarity for a fuzzy candidate to be accepted
    pub threshold: f64,
    pub algorithm: SimilarityAlgorithm,
    /// Confidence reported for pass-through results
    pub passthrough_confidence: f64,
}

impl NameCorrector {
    pub fn new(registry: Arc<CanonicalRegistry>) -> Self {
        Self {
            registry,
            threshold: 0.8,
            algorithm: SimilarityAlgorithm::default(),
            passthrough_confidence: 1.0,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_algorithm(mut self, algorithm: SimilarityAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_passthrough_confidence(mut self, confidence: f64) -> Self {
        self.passthrough_confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// The immutable registry snapshot this corrector resolves against.
    pub fn registry(&self) -> &CanonicalRegistry {
        &self.registry
    }

    /// Resolve a raw name. Never errors; empty/"N/A" input yields the
    /// unresolved sentinel.
    pub fn resolve(&self, kind: EntityKind, raw_name: Option<&str>) -> CorrectionResult {
        let Some(raw) = raw_name else {
            return CorrectionResult::unresolved();
        };
        if normalize::is_absent(Some(raw)) {
            return CorrectionResult::unresolved();
        }

        let cleaned = normalize::clean_text(raw);
        let key = normalize_key(&cleaned);

        // 1. Exact registry hit
        if let Some((corrected, confidence)) = self.registry.lookup(kind, &key) {
            return CorrectionResult {
                corrected_name: Some(corrected.to_string()),
                match_confidence: confidence,
                match_method: MatchMethod::Exact,
            };
        }

        // 2. Fuzzy scan over the registry keys for this kind. Ties break to
        // the alphabetically-first canonical name so reruns are deterministic.
        let mut best: Option<(&str, f64)> = None;
        for (candidate_key, entry) in self.registry.keys_for(kind) {
            let score = self.algorithm.score(&key, candidate_key);
            if score < self.threshold {
                continue;
            }
            best = match best {
                None => Some((entry.corrected_name.as_str(), score)),
                Some((current_name, current_score)) => {
                    if score > current_score
                        || (score == current_score
                            && entry.corrected_name.as_str() < current_name)
                    {
                        Some((entry.corrected_name.as_str(), score))
                    } else {
                        Some((current_name, current_score))
                    }
                }
            };
        }

        if let Some((corrected, score)) = best {
            debug!(kind = %kind, raw = %cleaned, corrected = %corrected, score, "Fuzzy match");
            return CorrectionResult {
                corrected_name: Some(corrected.to_string()),
                match_confidence: score,
                match_method: MatchMethod::Fuzzy,
            };
        }

        // 3. Pass-through: unknown names are never discarded, but they are
        // not silently "corrected" without evidence either.
        CorrectionResult {
            corrected_name: Some(cleaned),
            match_confidence: self.passthrough_confidence,
            match_method: MatchMethod::Passthrough,
        }
    }
}
