//! Post-merge data quality checks
//!
//! Mirrors the warehouse validation stage: null work-order numbers, average
//! completeness, categorization coverage. Checks read the store after a merge
//! and never mutate it.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::warehouse::WarehouseStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualitySeverity {
    /// Failing the check fails the run
    Error,
    /// Reported but non-fatal
    Warning,
}

/// One evaluated check
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QualityCheck {
    pub name: String,
    pub passed: bool,
    /// Observed value, for the run summary
    pub value: f64,
    pub severity: QualitySeverity,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QualityReport {
    pub checks: Vec<QualityCheck>,
}

impl QualityReport {
    /// True when no error-severity check failed.
    pub fn passed(&self) -> bool {
        self.checks
            .iter()
            .all(|c| c.passed || c.severity == QualitySeverity::Warning)
    }

    pub fn failed_checks(&self) -> Vec<&QualityCheck> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }
}

pub struct QualityChecker {
    /// Minimum acceptable average completeness across the fact table
    pub min_avg_completeness: f64,
}

impl QualityChecker {
    pub fn new(min_avg_completeness: f64) -> Self {
        Self {
            min_avg_completeness,
        }
    }

    pub async fn run(&self, store: &dyn WarehouseStore) -> Result<QualityReport> {
        let facts = store.facts().await?;
        let total = facts.len();

        let null_wo_numbers = facts
            .iter()
            .filter(|f| {
                f.work_order_number
                    .as_deref()
                    .map(|n| n.trim().is_empty())
                    .unwrap_or(true)
            })
            .count();

        let avg_completeness = if total == 0 {
            0.0
        } else {
            facts.iter().map(|f| f.completeness_score).sum::<f64>() / total as f64
        };

        let uncategorized = facts
            .iter()
            .filter(|f| f.ml_categorization.is_none())
            .count();

        let report = QualityReport {
            checks: vec![
                QualityCheck {
                    name: "no_null_work_order_numbers".to_string(),
                    passed: null_wo_numbers == 0,
                    value: null_wo_numbers as f64,
                    severity: QualitySeverity::Error,
                },
                QualityCheck {
                    name: "avg_completeness_above_threshold".to_string(),
                    passed: total == 0 || avg_completeness >= self.min_avg_completeness,
                    value: avg_completeness,
                    severity: QualitySeverity::Warning,
                },
                QualityCheck {
                    name: "all_records_categorized".to_string(),
                    passed: uncategorized == 0,
                    value: uncategorized as f64,
                    severity: QualitySeverity::Warning,
                },
            ],
        };

        for check in &report.checks {
            if check.passed {
                info!(check = %check.name, value = check.value, "Quality check passed");
            } else {
                warn!(check = %check.name, value = check.value, "Quality check FAILED");
            }
        }

        Ok(report)
    }
}
