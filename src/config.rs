//! Pipeline configuration
//!
//! Everything tunable in one serde struct: the required-field list, fuzzy
//! matching knobs, the century assumption for two-digit years, the routing
//! table, and the tier/activity thresholds. Loaded from a JSON file; the
//! runner bin layers env overrides on top.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::categorize::{CategorizationRouter, RouteEntry};
use crate::completeness::RequiredField;
use crate::correction::SimilarityAlgorithm;
use crate::error::Result;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FuzzyConfig {
    #[serde(default)]
    pub algorithm: SimilarityAlgorithm,

    /// Minimum similarity for a fuzzy candidate to be accepted
    pub threshold: f64,

    /// Confidence reported for pass-through results. 1.0 matches the
    /// reference behavior; lower it to make "no evidence" visible downstream.
    pub passthrough_confidence: f64,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            algorithm: SimilarityAlgorithm::default(),
            threshold: 0.8,
            passthrough_confidence: 1.0,
        }
    }
}

/// Thresholds for builder tier and activity classification
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TierConfig {
    /// Minimum total work orders for the medium tier
    pub medium_min: u64,
    /// Minimum total work orders for the high tier
    pub high_min: u64,
    /// Days since last order within which an entity counts as active
    pub active_days: i64,
    /// Days since last order within which an entity counts as dormant
    pub dormant_days: i64,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            medium_min: 10,
            high_min: 50,
            active_days: 90,
            dormant_days: 365,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Fields counted by the completeness scorer
    pub required_fields: Vec<RequiredField>,

    #[serde(default)]
    pub fuzzy: FuzzyConfig,

    /// Base added to two-digit years (`24` -> `2024` with the default)
    pub century_base: i32,

    /// Acceptance threshold for the semantic categorization strategy
    pub semantic_threshold: f64,

    /// Company identity -> strategy routing table
    pub routes: Vec<RouteEntry>,

    #[serde(default)]
    pub tiers: TierConfig,

    /// Quality gate: minimum average completeness across the fact table
    pub min_avg_completeness: f64,

    /// Watermark key for the fact table target
    pub watermark_target: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            required_fields: RequiredField::default_set(),
            fuzzy: FuzzyConfig::default(),
            century_base: 2000,
            semantic_threshold: 0.6,
            routes: CategorizationRouter::default_routes(),
            tiers: TierConfig::default(),
            min_avg_completeness: 0.8,
            watermark_target: "fct_work_orders".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: PipelineConfig = serde_json::from_str(&text).map_err(|e| {
            crate::error::EngineError::Config(format!(
                "Bad pipeline config {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Ok(config)
    }
}
