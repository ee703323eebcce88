//! Record model - raw extracted work orders and their resolved form
//!
//! `RawRecord` is the shape the upstream extractor hands us: noisy names,
//! abbreviated months, two-digit years, "N/A" placeholders. `ResolvedRecord`
//! is what the merge engine consumes after normalization, name correction,
//! scoring and categorization.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::EntityKind;

/// One work order as produced by the upstream extractor. Read-only to this core.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawRecord {
    /// Unique, immutable identifier assigned at extraction time
    pub work_order_id: String,

    /// Work order number as printed on the document (may be absent)
    #[serde(default)]
    pub work_order_number: Option<String>,

    #[serde(default)]
    pub builder_name_raw: Option<String>,

    #[serde(default)]
    pub project_name_raw: Option<String>,

    #[serde(default)]
    pub company_name_raw: Option<String>,

    /// Month as written on the document ("JAN", "Sept", ...)
    #[serde(default)]
    pub month_raw: Option<String>,

    /// Year as written on the document; the extractor may emit two digits
    #[serde(default)]
    pub year_raw: Option<i32>,

    #[serde(default)]
    pub description: Option<String>,

    /// Source document location, kept for audit
    #[serde(default)]
    pub file_url: Option<String>,

    /// Monotonically-assigned extraction timestamp; drives the merge watermark
    pub extracted_at: DateTime<Utc>,

    /// Up to four service groups from the document's service grid
    #[serde(default)]
    pub services: Vec<RawServiceGroup>,
}

impl RawRecord {
    /// A record without a work order id cannot be keyed into the fact table.
    pub fn is_malformed(&self) -> bool {
        self.work_order_id.trim().is_empty()
    }
}

/// One circled service category with its date/quantity/hours lines
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawServiceGroup {
    #[serde(default)]
    pub service_type: Option<String>,

    #[serde(default)]
    pub entries: Vec<RawServiceEntry>,
}

/// One date/quantity/hours line under a service group, all still free text
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawServiceEntry {
    #[serde(default)]
    pub date: Option<String>,

    #[serde(default)]
    pub quantity: Option<String>,

    #[serde(default)]
    pub hours: Option<String>,
}

/// How a raw name was matched to its corrected form
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    Exact,
    Fuzzy,
    Passthrough,
}

/// Outcome of a single name lookup against the canonical registry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CorrectionResult {
    /// Corrected canonical name; `None` for empty/sentinel input
    pub corrected_name: Option<String>,

    /// Confidence in [0, 1]
    pub match_confidence: f64,

    pub match_method: MatchMethod,
}

impl CorrectionResult {
    /// Sentinel result for empty or "N/A" input
    pub fn unresolved() -> Self {
        Self {
            corrected_name: None,
            match_confidence: 0.0,
            match_method: MatchMethod::Passthrough,
        }
    }
}

/// Outcome of routing a record through a categorization strategy
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CategorizationResult {
    pub category_label: String,

    /// Name of the strategy that produced the label
    pub strategy_used: String,

    /// Strategy-specific score; strict strategies carry none
    pub match_score: Option<f64>,
}

/// Per-record issue flags. Flagged records still merge; nothing is dropped silently.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordFlag {
    /// Month/year/company value outside the known tables
    NormalizationUncertain { field: String },

    /// No registry or fuzzy match cleared the threshold; name passed through
    UnresolvedEntity { entity_kind: EntityKind },

    /// No strategy produced a category above threshold
    CategorizationUnresolved,
}

/// A normalized service line, one per date entry on the document
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceLine {
    pub service_type: String,
    pub date: Option<String>,
    pub quantity: Option<f64>,
    pub hours: Option<f64>,
}

/// A fully resolved work order, ready for the incremental merge engine
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolvedRecord {
    pub work_order_id: String,
    pub work_order_number: Option<String>,

    pub builder: CorrectionResult,
    pub project: CorrectionResult,
    pub company: CorrectionResult,

    /// Original company string, preserved for audit when aliasing yields "N/A"
    pub company_raw: Option<String>,

    /// Canonical full month name, or the uppercased input if unrecognized
    pub month: Option<String>,
    pub year: Option<i32>,

    /// First of the normalized month/year, when both are known
    pub work_date: Option<NaiveDate>,

    pub description: Option<String>,
    pub services: Vec<ServiceLine>,

    pub completeness_score: f64,
    pub categorization: Option<CategorizationResult>,

    pub flags: Vec<RecordFlag>,

    pub file_url: Option<String>,
    pub extracted_at: DateTime<Utc>,
}

impl ResolvedRecord {
    pub fn has_flag(&self, flag: &RecordFlag) -> bool {
        self.flags.contains(flag)
    }
}
