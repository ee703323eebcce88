//! Pipeline driver - parallel per-record resolution feeding the merge engine
//!
//! Per-record work (normalization, correction, scoring, categorization) only
//! reads the immutable registry snapshot and fixed configuration, so records
//! resolve as independent spawned tasks with no ordering between them. The
//! merge engine then runs single-threaded over the resolved batch.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::categorize::{CategorizationRouter, UNCATEGORIZED};
use crate::completeness::CompletenessScorer;
use crate::config::PipelineConfig;
use crate::correction::NameCorrector;
use crate::error::{EngineError, Result};
use crate::merge::{IncrementalMergeEngine, MergeReport};
use crate::normalize;
use crate::quality::{QualityChecker, QualityReport};
use crate::record::{RawRecord, RecordFlag, ResolvedRecord};
use crate::registry::{CanonicalRegistry, EntityKind};
use crate::warehouse::WarehouseStore;

/// Everything needed to resolve one record. Cheap to clone; every field is
/// either small or behind an `Arc`, so tasks can carry their own copy.
#[derive(Clone)]
pub struct RecordResolver {
    corrector: NameCorrector,
    scorer: CompletenessScorer,
    router: Arc<CategorizationRouter>,
    century_base: i32,
}

impl RecordResolver {
    pub fn new(config: &PipelineConfig, registry: Arc<CanonicalRegistry>) -> Self {
        let corrector = NameCorrector::new(registry)
            .with_threshold(config.fuzzy.threshold)
            .with_algorithm(config.fuzzy.algorithm)
            .with_passthrough_confidence(config.fuzzy.passthrough_confidence);
        let router = Arc::new(CategorizationRouter::from_routes(
            &config.routes,
            config.semantic_threshold,
        ));
        Self {
            corrector,
            scorer: CompletenessScorer::new(config.required_fields.clone()),
            router,
            century_base: config.century_base,
        }
    }

    /// Normalize, correct, score and categorize one raw record. Never fails;
    /// problems become flags on the resolved record.
    pub fn resolve(&self, raw: &RawRecord) -> ResolvedRecord {
        let mut flags = Vec::new();

        // Field normalization first; correction and scoring see clean values.
        let month_norm = normalize::normalize_month(raw.month_raw.as_deref());
        if let Some(m) = &month_norm {
            if m.uncertain {
                flags.push(RecordFlag::NormalizationUncertain {
                    field: "month".to_string(),
                });
            }
        }
        let year = normalize::normalize_year(raw.year_raw, self.century_base);

        let company_norm = normalize::standardize_company(raw.company_name_raw.as_deref());
        if !company_norm.matched && !normalize::is_absent(raw.company_name_raw.as_deref()) {
            flags.push(RecordFlag::NormalizationUncertain {
                field: "company".to_string(),
            });
        }

        // Name correction over the registry snapshot. Builder and company are
        // categorical keys (uppercased); projects keep their case.
        let builder_input = raw
            .builder_name_raw
            .as_deref()
            .map(normalize::clean_categorical);
        let builder = self
            .corrector
            .resolve(EntityKind::Builder, builder_input.as_deref());

        let project_input = raw
            .project_name_raw
            .as_deref()
            .map(normalize::clean_project_name);
        let project = self
            .corrector
            .resolve(EntityKind::Project, project_input.as_deref());

        let company = self
            .corrector
            .resolve(EntityKind::Company, Some(company_norm.standardized.as_str()));

        for (kind, correction) in [
            (EntityKind::Builder, &builder),
            (EntityKind::Project, &project),
            (EntityKind::Company, &company),
        ] {
            let passthrough =
                correction.match_method == crate::record::MatchMethod::Passthrough;
            if passthrough
                && correction.corrected_name.is_some()
                && self.corrector.registry().kind_len(kind) > 0
            {
                flags.push(RecordFlag::UnresolvedEntity { entity_kind: kind });
            }
        }

        let work_date = match (&month_norm, year) {
            (Some(m), Some(y)) if !m.uncertain => normalize::month_number(&m.value)
                .and_then(|mo| chrono::NaiveDate::from_ymd_opt(y, mo, 1)),
            _ => None,
        };

        let services = normalize::normalize_services(&raw.services);

        let mut resolved = ResolvedRecord {
            work_order_id: raw.work_order_id.trim().to_string(),
            work_order_number: raw
                .work_order_number
                .as_deref()
                .filter(|n| !normalize::is_absent(Some(n)))
                .map(normalize::clean_text),
            builder,
            project,
            company,
            company_raw: raw.company_name_raw.clone(),
            month: month_norm.map(|m| m.value),
            year,
            work_date,
            description: raw
                .description
                .as_deref()
                .filter(|d| !normalize::is_absent(Some(d)))
                .map(normalize::clean_text),
            services,
            completeness_score: 0.0,
            categorization: None,
            flags,
            file_url: raw.file_url.clone(),
            extracted_at: raw.extracted_at,
        };

        // Scoring runs after normalization so sentinels are visible.
        resolved.completeness_score = self.scorer.score(&resolved);

        // Route to the company-specific strategy over description plus the
        // extracted service types.
        let text = record_text(&resolved);
        let categorization = self
            .router
            .categorize(resolved.company.corrected_name.as_deref(), &text);
        if categorization.category_label == UNCATEGORIZED {
            resolved.flags.push(RecordFlag::CategorizationUnresolved);
        }
        resolved.categorization = Some(categorization);

        resolved
    }
}

fn record_text(record: &ResolvedRecord) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(desc) = record.description.as_deref() {
        parts.push(desc);
    }
    for line in &record.services {
        parts.push(line.service_type.as_str());
    }
    parts.join(" ")
}

/// Outcome of one pipeline run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    /// Source labels of records excluded for missing work order ids
    pub malformed: Vec<String>,
    pub merge: MergeReport,
    pub quality: QualityReport,
}

impl RunReport {
    pub fn success(&self) -> bool {
        self.quality.passed()
    }
}

/// Ties the stages together: parallel resolution, serialized merge, quality.
pub struct WorkOrderPipeline {
    resolver: RecordResolver,
    engine: IncrementalMergeEngine,
    quality: QualityChecker,
}

impl WorkOrderPipeline {
    pub fn new(config: &PipelineConfig, registry: Arc<CanonicalRegistry>) -> Self {
        Self {
            resolver: RecordResolver::new(config, registry),
            engine: IncrementalMergeEngine::new(
                config.watermark_target.clone(),
                config.tiers.clone(),
            ),
            quality: QualityChecker::new(config.min_avg_completeness),
        }
    }

    pub fn resolver(&self) -> &RecordResolver {
        &self.resolver
    }

    /// Resolve and merge one batch. Malformed records (no work order id) are
    /// excluded and reported; they never abort the batch. A storage failure
    /// during the merge aborts the whole batch before the watermark advances.
    pub async fn run_batch(
        &self,
        batch: Vec<RawRecord>,
        store: &dyn WarehouseStore,
    ) -> Result<RunReport> {
        let (malformed, valid): (Vec<_>, Vec<_>) =
            batch.into_iter().partition(|r| r.is_malformed());

        let malformed: Vec<String> = malformed
            .into_iter()
            .map(|r| {
                let label = r
                    .file_url
                    .unwrap_or_else(|| "<unknown source>".to_string());
                warn!(source = %label, "Excluding record without work_order_id");
                label
            })
            .collect();

        info!(
            records = valid.len(),
            malformed = malformed.len(),
            "Resolving batch"
        );

        // Spawn all, await in order: record resolution shares nothing mutable.
        let handles: Vec<_> = valid
            .into_iter()
            .map(|record| {
                let resolver = self.resolver.clone();
                tokio::spawn(async move { resolver.resolve(&record) })
            })
            .collect();

        let mut resolved = Vec::with_capacity(handles.len());
        for handle in handles {
            let record = handle.await.map_err(|e| {
                EngineError::Correction(format!("Resolution task failed: {}", e))
            })?;
            resolved.push(record);
        }

        let merge = self.engine.merge(resolved, store).await?;
        let quality = self.quality.run(store).await?;

        Ok(RunReport {
            malformed,
            merge,
            quality,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MatchMethod;
    use crate::warehouse::MemoryWarehouse;
    use chrono::{TimeZone, Utc};

    fn registry() -> Arc<CanonicalRegistry> {
        Arc::new(CanonicalRegistry::from_entries(vec![(
            EntityKind::Builder,
            "ASCENSION HOMES".to_string(),
            "ASHTON HOMES".to_string(),
            0.95,
        )]))
    }

    fn raw(id: &str, minute: u32) -> RawRecord {
        RawRecord {
            work_order_id: id.to_string(),
            work_order_number: Some("1042".to_string()),
            builder_name_raw: Some("Ascension Homes".to_string()),
            project_name_raw: Some("Pinehurst Project/Phase 2".to_string()),
            company_name_raw: Some("AE3 Excavating Co".to_string()),
            month_raw: Some("JAN".to_string()),
            year_raw: Some(24),
            description: Some("Basement excavation on lot 4".to_string()),
            file_url: Some(format!("gs://orders/{}.pdf", id)),
            extracted_at: Utc.with_ymd_and_hms(2024, 1, 15, 12, minute, 0).unwrap(),
            services: Vec::new(),
        }
    }

    #[test]
    fn test_resolve_applies_all_stages() {
        let resolver = RecordResolver::new(&PipelineConfig::default(), registry());
        let resolved = resolver.resolve(&raw("WO1", 0));

        assert_eq!(resolved.builder.corrected_name.as_deref(), Some("ASHTON HOMES"));
        assert_eq!(resolved.builder.match_method, MatchMethod::Exact);
        assert_eq!(resolved.month.as_deref(), Some("JANUARY"));
        assert_eq!(resolved.year, Some(2024));
        assert_eq!(
            resolved.company.corrected_name.as_deref(),
            Some("AE3 Excavating")
        );
        assert_eq!(
            resolved.project.corrected_name.as_deref(),
            Some("Pinehurst 2")
        );
        assert_eq!(
            resolved.work_date,
            chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
        );
        assert!(resolved.completeness_score > 0.0);
        let categorization = resolved.categorization.as_ref().unwrap();
        assert_eq!(categorization.strategy_used, "semantic_overlap");
        assert_eq!(categorization.category_label, "Basement Excavation");
    }

    #[test]
    fn test_resolve_flags_unknown_month() {
        let resolver = RecordResolver::new(&PipelineConfig::default(), registry());
        let mut record = raw("WO1", 0);
        record.month_raw = Some("Foo".to_string());

        let resolved = resolver.resolve(&record);
        assert_eq!(resolved.month.as_deref(), Some("FOO"));
        assert!(resolved.has_flag(&RecordFlag::NormalizationUncertain {
            field: "month".to_string()
        }));
        assert_eq!(resolved.work_date, None);
    }

    #[tokio::test]
    async fn test_run_batch_excludes_malformed_without_aborting() {
        let pipeline = WorkOrderPipeline::new(&PipelineConfig::default(), registry());
        let store = MemoryWarehouse::new();

        let mut bad = raw("", 1);
        bad.file_url = Some("gs://orders/broken.pdf".to_string());

        let report = pipeline
            .run_batch(vec![raw("WO1", 0), bad], &store)
            .await
            .unwrap();

        assert_eq!(report.malformed, vec!["gs://orders/broken.pdf".to_string()]);
        assert_eq!(report.merge.records_merged, 1);
        assert_eq!(store.facts().await.unwrap().len(), 1);
    }
}
