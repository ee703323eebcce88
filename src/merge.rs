//! Incremental Merge Engine - watermark delta, surrogate keys, idempotent upserts
//!
//! Takes resolved records, filters them against the target's watermark,
//! folds them into dimension aggregates (lookup-before-generate on surrogate
//! keys), and hands the store one atomic batch. Re-running an already-merged
//! batch is a no-op: the watermark filter drops every record, so aggregates
//! are never double-counted and facts never duplicate.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use itertools::Itertools;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::TierConfig;
use crate::error::Result;
use crate::record::{RecordFlag, ResolvedRecord};
use crate::registry::EntityKind;
use crate::warehouse::{DimensionRow, FactRow, MergeBatch, WarehouseStore};

lazy_static! {
    /// Namespace for surrogate keys. Fixed, so the same corrected name yields
    /// the same key in every run and every process.
    static ref SURROGATE_NAMESPACE: Uuid =
        Uuid::new_v5(&Uuid::NAMESPACE_DNS, b"workorder-engine.warehouse");
}

/// Surrogate key for a corrected name: a pure function, stable across runs.
pub fn surrogate_key(kind: EntityKind, corrected_name: &str) -> Uuid {
    let material = format!("{}:{}", kind.as_str(), corrected_name);
    Uuid::new_v5(&SURROGATE_NAMESPACE, material.as_bytes())
}

/// Builder volume tier from the total order count.
pub fn classify_tier(total_work_orders: u64, tiers: &TierConfig) -> &'static str {
    if total_work_orders >= tiers.high_min {
        "High Volume"
    } else if total_work_orders >= tiers.medium_min {
        "Medium Volume"
    } else {
        "Low Volume"
    }
}

/// Recency classification from days since the last order. `None` when the
/// entity has no dated orders yet.
pub fn classify_activity(
    last_date: Option<NaiveDate>,
    as_of: NaiveDate,
    tiers: &TierConfig,
) -> Option<&'static str> {
    let last = last_date?;
    let days = (as_of - last).num_days();
    Some(if days <= tiers.active_days {
        "Active"
    } else if days <= tiers.dormant_days {
        "Dormant"
    } else {
        "Inactive"
    })
}

/// A record that merged with issue flags attached
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlaggedRecord {
    pub work_order_id: String,
    pub flags: Vec<RecordFlag>,
}

/// What one merge run did
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeReport {
    pub run_id: Uuid,

    /// Watermark before the run
    pub previous_watermark: Option<DateTime<Utc>>,

    pub records_received: usize,
    /// Records at or below the watermark, dropped from the delta
    pub records_skipped: usize,
    pub records_merged: usize,

    /// Records that merged carrying flags; nothing here was dropped
    pub flagged: Vec<FlaggedRecord>,

    pub dimensions_inserted: usize,
    pub dimensions_updated: usize,
    /// Touched dimension rows per entity kind
    pub dimensions_by_kind: HashMap<EntityKind, usize>,
    pub facts_written: usize,

    /// Watermark after the run; `None` when nothing merged
    pub new_watermark: Option<DateTime<Utc>>,
}

/// Computes merge batches and applies them through a `WarehouseStore`.
///
/// Surrogate-key resolution and dimension aggregation run single-threaded per
/// batch: two records naming the same corrected entity must fold into one row,
/// never mint two keys.
pub struct IncrementalMergeEngine {
    /// Watermark key for the fact table
    pub target: String,
    pub tiers: TierConfig,
}

impl IncrementalMergeEngine {
    pub fn new(target: impl Into<String>, tiers: TierConfig) -> Self {
        Self {
            target: target.into(),
            tiers,
        }
    }

    pub async fn merge(
        &self,
        batch: Vec<ResolvedRecord>,
        store: &dyn WarehouseStore,
    ) -> Result<MergeReport> {
        let run_id = Uuid::new_v4();
        let previous_watermark = store.watermark(&self.target).await?;
        let records_received = batch.len();

        // 1. Delta: only records past the watermark. extracted_at is
        // monotonically non-decreasing per source, so everything at or below
        // the mark has already merged.
        let (delta, skipped): (Vec<_>, Vec<_>) = batch
            .into_iter()
            .partition(|r| previous_watermark.map_or(true, |w| r.extracted_at > w));

        if !skipped.is_empty() {
            info!(
                skipped = skipped.len(),
                watermark = ?previous_watermark,
                "Records at or below watermark skipped"
            );
        }

        if delta.is_empty() {
            return Ok(MergeReport {
                run_id,
                previous_watermark,
                records_received,
                records_skipped: skipped.len(),
                records_merged: 0,
                flagged: Vec::new(),
                dimensions_inserted: 0,
                dimensions_updated: 0,
                dimensions_by_kind: HashMap::new(),
                facts_written: 0,
                new_watermark: None,
            });
        }

        // 2. Existing dimension state, for lookup-before-generate and for
        // accumulating aggregates across batches.
        let existing: HashMap<(EntityKind, String), DimensionRow> = store
            .dimensions()
            .await?
            .into_iter()
            .map(|d| ((d.kind, d.corrected_name.clone()), d))
            .collect();

        let now = Utc::now();
        let mut touched: HashMap<(EntityKind, String), DimensionRow> = HashMap::new();
        let mut facts = Vec::with_capacity(delta.len());
        let mut flagged = Vec::new();

        // 3. Single-threaded fold over the delta.
        for record in &delta {
            let builder_name = clean_entity_name(&record.builder.corrected_name);
            let project_name = clean_entity_name(&record.project.corrected_name);
            let company_name = clean_entity_name(&record.company.corrected_name);

            let builder_key = builder_name.as_ref().map(|name| {
                self.touch_dimension(
                    &mut touched,
                    &existing,
                    EntityKind::Builder,
                    name,
                    record.work_date,
                    project_name.as_deref(),
                    now,
                )
            });
            let project_key = project_name.as_ref().map(|name| {
                self.touch_dimension(
                    &mut touched,
                    &existing,
                    EntityKind::Project,
                    name,
                    record.work_date,
                    builder_name.as_deref(),
                    now,
                )
            });
            let company_key = company_name.as_ref().map(|name| {
                self.touch_dimension(
                    &mut touched,
                    &existing,
                    EntityKind::Company,
                    name,
                    record.work_date,
                    builder_name.as_deref(),
                    now,
                )
            });

            let quarantined = builder_key.is_none() && company_key.is_none();
            if quarantined {
                warn!(work_order_id = %record.work_order_id, "Record quarantined: no resolvable entities");
            }
            if !record.flags.is_empty() {
                flagged.push(FlaggedRecord {
                    work_order_id: record.work_order_id.clone(),
                    flags: record.flags.clone(),
                });
            }

            facts.push(FactRow {
                work_order_id: record.work_order_id.clone(),
                work_order_number: record.work_order_number.clone(),
                builder_key,
                project_key,
                company_key,
                work_date: record.work_date,
                completeness_score: record.completeness_score,
                ml_categorization: record
                    .categorization
                    .as_ref()
                    .map(|c| c.category_label.clone()),
                description: record.description.clone(),
                quarantined,
                file_url: record.file_url.clone(),
                extracted_at: record.extracted_at,
                loaded_at: now,
            });
        }

        // 4. Classification is a pure function of the up-to-date aggregates,
        // recomputed every merge. Untouched rows whose activity drifted get
        // restamped too.
        let as_of = now.date_naive();
        let mut dimensions: Vec<DimensionRow> = Vec::with_capacity(touched.len());
        let mut dimensions_inserted = 0;
        let mut dimensions_updated = 0;
        for ((kind, name), mut dim) in touched.drain() {
            dim.tier = match kind {
                EntityKind::Builder => {
                    Some(classify_tier(dim.total_work_orders, &self.tiers).to_string())
                }
                _ => None,
            };
            dim.activity_status =
                classify_activity(dim.last_date, as_of, &self.tiers).map(str::to_string);
            if existing.contains_key(&(kind, name)) {
                dimensions_updated += 1;
            } else {
                dimensions_inserted += 1;
            }
            dimensions.push(dim);
        }
        for ((kind, name), dim) in &existing {
            if dimensions
                .iter()
                .any(|d| d.kind == *kind && d.corrected_name == *name)
            {
                continue;
            }
            let tier = match kind {
                EntityKind::Builder => {
                    Some(classify_tier(dim.total_work_orders, &self.tiers).to_string())
                }
                _ => None,
            };
            let activity =
                classify_activity(dim.last_date, as_of, &self.tiers).map(str::to_string);
            if tier != dim.tier || activity != dim.activity_status {
                let mut restamped = dim.clone();
                restamped.tier = tier;
                restamped.activity_status = activity;
                restamped.updated_at = now;
                dimensions_updated += 1;
                dimensions.push(restamped);
            }
        }

        let dimensions_by_kind = dimensions.iter().counts_by(|d| d.kind);

        // 5. Watermark advances to the batch maximum, but only lands if the
        // upsert commits; a failed apply leaves the pre-batch state intact
        // and the batch safely re-runnable.
        let new_watermark = delta.iter().map(|r| r.extracted_at).max();
        let facts_written = facts.len();
        let records_merged = delta.len();

        store
            .apply(MergeBatch {
                target: self.target.clone(),
                dimensions,
                facts,
                new_watermark,
            })
            .await
            .map_err(|e| crate::error::EngineError::Merge(format!("Batch upsert failed: {}", e)))?;

        info!(
            %run_id,
            records_merged,
            facts_written,
            dimensions_inserted,
            dimensions_updated,
            new_watermark = ?new_watermark,
            "Merge batch committed"
        );

        Ok(MergeReport {
            run_id,
            previous_watermark,
            records_received,
            records_skipped: skipped.len(),
            records_merged,
            flagged,
            dimensions_inserted,
            dimensions_updated,
            dimensions_by_kind,
            facts_written,
            new_watermark,
        })
    }

    /// Fold one record's contribution into a dimension row, creating the row
    /// (lookup-before-generate on the surrogate key) if this is the first
    /// time the corrected name appears.
    #[allow(clippy::too_many_arguments)]
    fn touch_dimension(
        &self,
        touched: &mut HashMap<(EntityKind, String), DimensionRow>,
        existing: &HashMap<(EntityKind, String), DimensionRow>,
        kind: EntityKind,
        name: &str,
        work_date: Option<NaiveDate>,
        related: Option<&str>,
        now: DateTime<Utc>,
    ) -> Uuid {
        let entry = touched
            .entry((kind, name.to_string()))
            .or_insert_with(|| match existing.get(&(kind, name.to_string())) {
                // Reuse the key from prior runs so aggregates keep accruing
                // onto the same row.
                Some(row) => row.clone(),
                None => DimensionRow {
                    surrogate_key: surrogate_key(kind, name),
                    kind,
                    corrected_name: name.to_string(),
                    total_work_orders: 0,
                    first_date: None,
                    last_date: None,
                    related_entities: BTreeSet::new(),
                    tier: None,
                    activity_status: None,
                    updated_at: now,
                },
            });

        entry.total_work_orders += 1;
        if let Some(date) = work_date {
            entry.first_date = Some(entry.first_date.map_or(date, |d| d.min(date)));
            entry.last_date = Some(entry.last_date.map_or(date, |d| d.max(date)));
        }
        if let Some(related) = related {
            entry.related_entities.insert(related.to_string());
        }
        entry.updated_at = now;
        entry.surrogate_key
    }
}

/// Dimension rows are only minted for real names; sentinels stay out of the
/// warehouse.
fn clean_entity_name(corrected: &Option<String>) -> Option<String> {
    corrected
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case(crate::normalize::NA))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CorrectionResult, MatchMethod};
    use crate::warehouse::MemoryWarehouse;
    use async_trait::async_trait;
    use chrono::TimeZone;

    fn correction(name: &str) -> CorrectionResult {
        CorrectionResult {
            corrected_name: Some(name.to_string()),
            match_confidence: 1.0,
            match_method: MatchMethod::Exact,
        }
    }

    fn record(id: &str, builder: &str, minute: u32) -> ResolvedRecord {
        ResolvedRecord {
            work_order_id: id.to_string(),
            work_order_number: Some(format!("#{}", id)),
            builder: correction(builder),
            project: correction("Pinehurst PH 2"),
            company: correction("AE3 Excavating"),
            company_raw: None,
            month: Some("JANUARY".to_string()),
            year: Some(2024),
            work_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            description: Some("basement excavation".to_string()),
            services: Vec::new(),
            completeness_score: 1.0,
            categorization: None,
            flags: Vec::new(),
            file_url: None,
            extracted_at: Utc.with_ymd_and_hms(2024, 1, 15, 12, minute, 0).unwrap(),
        }
    }

    fn engine() -> IncrementalMergeEngine {
        IncrementalMergeEngine::new("fct_work_orders", TierConfig::default())
    }

    #[test]
    fn test_surrogate_key_is_stable_and_kind_scoped() {
        let a = surrogate_key(EntityKind::Builder, "ASHTON HOMES");
        let b = surrogate_key(EntityKind::Builder, "ASHTON HOMES");
        let c = surrogate_key(EntityKind::Company, "ASHTON HOMES");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_tier_thresholds() {
        let tiers = TierConfig::default();
        assert_eq!(classify_tier(1, &tiers), "Low Volume");
        assert_eq!(classify_tier(10, &tiers), "Medium Volume");
        assert_eq!(classify_tier(49, &tiers), "Medium Volume");
        assert_eq!(classify_tier(50, &tiers), "High Volume");
    }

    #[test]
    fn test_activity_thresholds() {
        let tiers = TierConfig::default();
        let as_of = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        let recent = NaiveDate::from_ymd_opt(2024, 12, 1).unwrap();
        let old = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let ancient = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        assert_eq!(classify_activity(Some(recent), as_of, &tiers), Some("Active"));
        assert_eq!(classify_activity(Some(old), as_of, &tiers), Some("Dormant"));
        assert_eq!(
            classify_activity(Some(ancient), as_of, &tiers),
            Some("Inactive")
        );
        assert_eq!(classify_activity(None, as_of, &tiers), None);
    }

    #[tokio::test]
    async fn test_merge_is_idempotent_across_reruns() {
        let store = MemoryWarehouse::new();
        let engine = engine();
        let batch = vec![record("WO1", "ASHTON HOMES", 0), record("WO2", "ASHTON HOMES", 1)];

        let first = engine.merge(batch.clone(), &store).await.unwrap();
        assert_eq!(first.records_merged, 2);
        assert_eq!(first.facts_written, 2);

        let second = engine.merge(batch, &store).await.unwrap();
        assert_eq!(second.records_merged, 0);
        assert_eq!(second.records_skipped, 2);
        assert_eq!(second.new_watermark, None);

        let dims = store.dimensions().await.unwrap();
        let builder = dims
            .iter()
            .find(|d| d.kind == EntityKind::Builder)
            .unwrap();
        assert_eq!(builder.total_work_orders, 2);
        assert_eq!(store.facts().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_aggregates_accumulate_across_batches() {
        let store = MemoryWarehouse::new();
        let engine = engine();

        engine
            .merge(vec![record("WO1", "ASHTON HOMES", 0)], &store)
            .await
            .unwrap();
        let report = engine
            .merge(vec![record("WO2", "ASHTON HOMES", 5)], &store)
            .await
            .unwrap();

        // Second batch updates the existing builder row rather than minting
        // a new one
        assert_eq!(report.dimensions_inserted, 0);
        let dims = store.dimensions().await.unwrap();
        let builder = dims
            .iter()
            .find(|d| d.kind == EntityKind::Builder)
            .unwrap();
        assert_eq!(builder.total_work_orders, 2);
        assert_eq!(builder.surrogate_key, surrogate_key(EntityKind::Builder, "ASHTON HOMES"));
        assert_eq!(builder.tier.as_deref(), Some("Low Volume"));
        assert_eq!(builder.total_related_entities(), 1);
    }

    #[tokio::test]
    async fn test_new_builder_dimension_has_count_one() {
        let store = MemoryWarehouse::new();
        let report = engine()
            .merge(vec![record("WO1", "ASHTON HOMES", 0)], &store)
            .await
            .unwrap();

        assert_eq!(report.dimensions_inserted, 3); // builder, project, company
        assert_eq!(report.dimensions_by_kind[&EntityKind::Builder], 1);

        let dims = store.dimensions().await.unwrap();
        let builder = dims
            .iter()
            .find(|d| d.kind == EntityKind::Builder)
            .unwrap();
        assert_eq!(builder.corrected_name, "ASHTON HOMES");
        assert_eq!(builder.total_work_orders, 1);
    }

    #[tokio::test]
    async fn test_unresolved_entities_quarantine_but_still_merge() {
        let store = MemoryWarehouse::new();
        let mut r = record("WO9", "ASHTON HOMES", 0);
        r.builder = CorrectionResult::unresolved();
        r.company = CorrectionResult::unresolved();
        r.project = CorrectionResult::unresolved();

        let report = engine().merge(vec![r], &store).await.unwrap();
        assert_eq!(report.facts_written, 1);

        let facts = store.facts().await.unwrap();
        assert_eq!(facts.len(), 1);
        assert!(facts[0].quarantined);
        assert_eq!(facts[0].builder_key, None);
    }

    struct FailingStore {
        inner: MemoryWarehouse,
    }

    #[async_trait]
    impl WarehouseStore for FailingStore {
        async fn watermark(&self, target: &str) -> Result<Option<DateTime<Utc>>> {
            self.inner.watermark(target).await
        }
        async fn dimensions(&self) -> Result<Vec<DimensionRow>> {
            self.inner.dimensions().await
        }
        async fn facts(&self) -> Result<Vec<FactRow>> {
            self.inner.facts().await
        }
        async fn apply(&self, _batch: MergeBatch) -> Result<()> {
            Err(crate::error::EngineError::Storage(
                "connection lost".to_string(),
            ))
        }
    }

    #[tokio::test]
    async fn test_store_failure_leaves_watermark_untouched() {
        let store = FailingStore {
            inner: MemoryWarehouse::new(),
        };
        let result = engine().merge(vec![record("WO1", "ASHTON HOMES", 0)], &store).await;
        assert!(result.is_err());
        assert_eq!(store.watermark("fct_work_orders").await.unwrap(), None);
        assert!(store.facts().await.unwrap().is_empty());
    }
}
