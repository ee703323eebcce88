use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use workorder_engine::config::PipelineConfig;
use workorder_engine::merge::surrogate_key;
use workorder_engine::record::{MatchMethod, RawRecord};
use workorder_engine::registry::{CanonicalRegistry, EntityKind};
use workorder_engine::warehouse::{MemoryWarehouse, SqliteWarehouse, WarehouseStore};
use workorder_engine::WorkOrderPipeline;

fn registry() -> Arc<CanonicalRegistry> {
    Arc::new(CanonicalRegistry::from_entries(vec![(
        EntityKind::Builder,
        "ASCENSION HOMES".to_string(),
        "ASHTON HOMES".to_string(),
        0.95,
    )]))
}

fn wo1() -> RawRecord {
    RawRecord {
        work_order_id: "WO1".to_string(),
        work_order_number: Some("1042".to_string()),
        builder_name_raw: Some("Ascension Homes".to_string()),
        project_name_raw: Some("Pinehurst PH 2".to_string()),
        company_name_raw: Some("AE3 Excavating Co".to_string()),
        month_raw: Some("JAN".to_string()),
        year_raw: Some(24),
        description: Some("Basement excavation on lot 4".to_string()),
        file_url: Some("gs://orders/wo1.pdf".to_string()),
        extracted_at: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
        services: Vec::new(),
    }
}

fn wo2() -> RawRecord {
    RawRecord {
        work_order_id: "WO2".to_string(),
        work_order_number: Some("1043".to_string()),
        builder_name_raw: Some("Ascension Homes".to_string()),
        project_name_raw: Some("Pinehurst PH 2".to_string()),
        company_name_raw: Some("aeon".to_string()),
        month_raw: Some("Sept".to_string()),
        year_raw: Some(2024),
        description: Some("Install straw on lots 6-9".to_string()),
        file_url: Some("gs://orders/wo2.pdf".to_string()),
        extracted_at: Utc.with_ymd_and_hms(2024, 9, 20, 9, 30, 0).unwrap(),
        services: Vec::new(),
    }
}

#[tokio::test]
async fn test_end_to_end_single_record_scenario() {
    let pipeline = WorkOrderPipeline::new(&PipelineConfig::default(), registry());
    let store = MemoryWarehouse::new();

    let report = pipeline.run_batch(vec![wo1()], &store).await.unwrap();
    assert_eq!(report.merge.records_merged, 1);
    assert!(report.malformed.is_empty());

    // The registry correction, date normalization and company aliasing all
    // land on the fact row
    let facts = store.facts().await.unwrap();
    assert_eq!(facts.len(), 1);
    let fact = &facts[0];
    assert_eq!(fact.work_order_id, "WO1");
    assert_eq!(fact.work_date, NaiveDate::from_ymd_opt(2024, 1, 1));
    assert_eq!(
        fact.builder_key,
        Some(surrogate_key(EntityKind::Builder, "ASHTON HOMES"))
    );
    assert_eq!(
        fact.company_key,
        Some(surrogate_key(EntityKind::Company, "AE3 Excavating"))
    );
    assert!(!fact.quarantined);

    // A new builder dimension row exists with a single order
    let dims = store.dimensions().await.unwrap();
    let builder = dims
        .iter()
        .find(|d| d.kind == EntityKind::Builder)
        .expect("builder dimension row");
    assert_eq!(builder.corrected_name, "ASHTON HOMES");
    assert_eq!(builder.total_work_orders, 1);
    assert_eq!(builder.first_date, NaiveDate::from_ymd_opt(2024, 1, 1));
    assert_eq!(builder.tier.as_deref(), Some("Low Volume"));
}

#[tokio::test]
async fn test_rerunning_the_same_batch_changes_nothing() {
    let pipeline = WorkOrderPipeline::new(&PipelineConfig::default(), registry());
    let store = MemoryWarehouse::new();

    pipeline
        .run_batch(vec![wo1(), wo2()], &store)
        .await
        .unwrap();
    let facts_before = store.facts().await.unwrap().len();
    let builder_before = store
        .dimensions()
        .await
        .unwrap()
        .into_iter()
        .find(|d| d.kind == EntityKind::Builder)
        .unwrap();

    let replay = pipeline
        .run_batch(vec![wo1(), wo2()], &store)
        .await
        .unwrap();
    assert_eq!(replay.merge.records_merged, 0);
    assert_eq!(replay.merge.records_skipped, 2);

    let builder_after = store
        .dimensions()
        .await
        .unwrap()
        .into_iter()
        .find(|d| d.kind == EntityKind::Builder)
        .unwrap();
    assert_eq!(store.facts().await.unwrap().len(), facts_before);
    assert_eq!(
        builder_after.total_work_orders,
        builder_before.total_work_orders
    );
    assert_eq!(builder_after.surrogate_key, builder_before.surrogate_key);
}

#[tokio::test]
async fn test_overlapping_batches_accumulate_without_double_counting() {
    let pipeline = WorkOrderPipeline::new(&PipelineConfig::default(), registry());
    let store = MemoryWarehouse::new();

    pipeline.run_batch(vec![wo1()], &store).await.unwrap();
    // Second batch re-ships WO1 alongside the new record; the watermark
    // drops the overlap
    let report = pipeline
        .run_batch(vec![wo1(), wo2()], &store)
        .await
        .unwrap();
    assert_eq!(report.merge.records_merged, 1);
    assert_eq!(report.merge.records_skipped, 1);

    let dims = store.dimensions().await.unwrap();
    let builder = dims
        .iter()
        .find(|d| d.kind == EntityKind::Builder)
        .unwrap();
    assert_eq!(builder.total_work_orders, 2);
    assert_eq!(builder.last_date, NaiveDate::from_ymd_opt(2024, 9, 1));
    // Both companies routed through their own strategies
    let facts = store.facts().await.unwrap();
    let wo2_fact = facts.iter().find(|f| f.work_order_id == "WO2").unwrap();
    assert_eq!(
        wo2_fact.ml_categorization.as_deref(),
        Some("Straw Installation")
    );
}

#[tokio::test]
async fn test_surrogate_keys_survive_process_restart() {
    let path = std::env::temp_dir().join(format!(
        "workorder_engine_test_{}.db",
        std::process::id()
    ));
    let _ = std::fs::remove_file(&path);

    // First "process": merge WO1
    {
        let pipeline = WorkOrderPipeline::new(&PipelineConfig::default(), registry());
        let store = SqliteWarehouse::open(&path).unwrap();
        pipeline.run_batch(vec![wo1()], &store).await.unwrap();
    }

    // Second "process": fresh pipeline and store over the same file
    {
        let pipeline = WorkOrderPipeline::new(&PipelineConfig::default(), registry());
        let store = SqliteWarehouse::open(&path).unwrap();
        let report = pipeline.run_batch(vec![wo2()], &store).await.unwrap();
        assert_eq!(report.merge.records_merged, 1);

        let dims = store.dimensions().await.unwrap();
        let builders: Vec<_> = dims
            .iter()
            .filter(|d| d.kind == EntityKind::Builder)
            .collect();
        // Same corrected name resolved in two separate runs lands on one row
        assert_eq!(builders.len(), 1);
        assert_eq!(builders[0].total_work_orders, 2);
        assert_eq!(
            builders[0].surrogate_key,
            surrogate_key(EntityKind::Builder, "ASHTON HOMES")
        );
    }

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_resolution_of_known_field_variants() {
    let pipeline = WorkOrderPipeline::new(&PipelineConfig::default(), registry());
    let resolved = pipeline.resolver().resolve(&wo1());

    assert_eq!(
        resolved.builder.corrected_name.as_deref(),
        Some("ASHTON HOMES")
    );
    assert_eq!(resolved.builder.match_method, MatchMethod::Exact);
    assert!((resolved.builder.match_confidence - 0.95).abs() < f64::EPSILON);
    assert_eq!(resolved.month.as_deref(), Some("JANUARY"));
    assert_eq!(resolved.year, Some(2024));
    assert_eq!(
        resolved.company.corrected_name.as_deref(),
        Some("AE3 Excavating")
    );
    assert!((0.0..=1.0).contains(&resolved.completeness_score));
}
