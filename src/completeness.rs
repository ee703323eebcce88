//! Completeness Scorer - fraction of required fields present after normalization
//!
//! Scoring runs on the resolved record, not the raw one, so that normalized
//! sentinels are visible. Decision: the "N/A" sentinel (and an unresolved
//! correction) counts as absent.

use serde::{Deserialize, Serialize};

use crate::record::ResolvedRecord;

/// The fields that count toward the completeness score
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredField {
    WorkOrderNumber,
    Builder,
    Project,
    Month,
    Year,
    Company,
    Description,
}

impl RequiredField {
    /// The reference system's seven-field list.
    pub fn default_set() -> Vec<RequiredField> {
        vec![
            RequiredField::WorkOrderNumber,
            RequiredField::Builder,
            RequiredField::Project,
            RequiredField::Month,
            RequiredField::Year,
            RequiredField::Company,
            RequiredField::Description,
        ]
    }
}

/// Computes `count(required fields present) / len(required_fields)`.
#[derive(Clone, Debug)]
pub struct CompletenessScorer {
    required_fields: Vec<RequiredField>,
}

impl Default for CompletenessScorer {
    fn default() -> Self {
        Self {
            required_fields: RequiredField::default_set(),
        }
    }
}

impl CompletenessScorer {
    pub fn new(required_fields: Vec<RequiredField>) -> Self {
        Self { required_fields }
    }

    /// Score a resolved record. Always in [0, 1]; an empty field list scores 0.
    pub fn score(&self, record: &ResolvedRecord) -> f64 {
        if self.required_fields.is_empty() {
            return 0.0;
        }
        let present = self
            .required_fields
            .iter()
            .filter(|f| self.is_present(record, **f))
            .count();
        (present as f64 / self.required_fields.len() as f64).clamp(0.0, 1.0)
    }

    fn is_present(&self, record: &ResolvedRecord, field: RequiredField) -> bool {
        fn non_empty(value: Option<&str>) -> bool {
            value.map(|s| !s.trim().is_empty()).unwrap_or(false)
        }

        match field {
            RequiredField::WorkOrderNumber => non_empty(record.work_order_number.as_deref()),
            RequiredField::Builder => non_empty(record.builder.corrected_name.as_deref()),
            RequiredField::Project => non_empty(record.project.corrected_name.as_deref()),
            RequiredField::Month => non_empty(record.month.as_deref()),
            RequiredField::Year => record.year.is_some(),
            // The company sentinel means "we could not standardize this";
            // it does not count as data.
            RequiredField::Company => non_empty(record.company.corrected_name.as_deref()),
            RequiredField::Description => non_empty(record.description.as_deref()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CorrectionResult, MatchMethod};
    use chrono::Utc;

    fn record() -> ResolvedRecord {
        ResolvedRecord {
            work_order_id: "WO1".to_string(),
            work_order_number: Some("1042".to_string()),
            builder: CorrectionResult {
                corrected_name: Some("ASHTON HOMES".to_string()),
                match_confidence: 0.95,
                match_method: MatchMethod::Exact,
            },
            project: CorrectionResult {
                corrected_name: Some("Pinehurst PH 2".to_string()),
                match_confidence: 1.0,
                match_method: MatchMethod::Passthrough,
            },
            company: CorrectionResult {
                corrected_name: Some("AE3 Excavating".to_string()),
                match_confidence: 1.0,
                match_method: MatchMethod::Exact,
            },
            company_raw: Some("AE3 Excavating Co".to_string()),
            month: Some("JANUARY".to_string()),
            year: Some(2024),
            work_date: None,
            description: Some("Excavate infiltration trench".to_string()),
            services: Vec::new(),
            completeness_score: 0.0,
            categorization: None,
            flags: Vec::new(),
            file_url: None,
            extracted_at: Utc::now(),
        }
    }

    #[test]
    fn test_full_record_scores_one() {
        let scorer = CompletenessScorer::default();
        assert_eq!(scorer.score(&record()), 1.0);
    }

    #[test]
    fn test_score_stays_in_unit_interval() {
        let scorer = CompletenessScorer::default();
        let mut r = record();
        r.work_order_number = None;
        r.description = None;
        let score = scorer.score(&r);
        assert!((0.0..=1.0).contains(&score));
        assert!((score - 5.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_unresolved_company_sentinel_counts_as_absent() {
        let scorer = CompletenessScorer::default();
        let mut r = record();
        // Unknown company: aliasing produced the sentinel, corrector saw "N/A"
        r.company = CorrectionResult::unresolved();
        let score = scorer.score(&r);
        assert!((score - 6.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_field_list_scores_zero() {
        let scorer = CompletenessScorer::new(Vec::new());
        assert_eq!(scorer.score(&record()), 0.0);
    }
}
