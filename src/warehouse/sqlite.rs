//! SQLite warehouse store
//!
//! Persistent backend for local runs. One connection behind a mutex; each
//! merge batch is applied inside a single transaction so a mid-batch failure
//! rolls the warehouse back to its pre-batch state and the watermark never
//! advances past rows that did not land.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Row};
use tracing::info;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::registry::EntityKind;
use crate::warehouse::{DimensionRow, FactRow, MergeBatch, WarehouseStore};

pub struct SqliteWarehouse {
    db: Mutex<Connection>,
}

impl SqliteWarehouse {
    /// Open (or create) a warehouse database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Connection::open(path.as_ref())
            .map_err(|e| EngineError::Storage(format!("Failed to open warehouse: {}", e)))?;
        let store = Self { db: Mutex::new(db) };
        store.init_schema()?;
        info!(path = %path.as_ref().display(), "Opened SQLite warehouse");
        Ok(store)
    }

    /// Ephemeral database, handy in tests.
    pub fn in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()
            .map_err(|e| EngineError::Storage(format!("Failed to open warehouse: {}", e)))?;
        let store = Self { db: Mutex::new(db) };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let db = self.lock()?;
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS dim_entities (
                surrogate_key     TEXT PRIMARY KEY,
                kind              TEXT NOT NULL,
                corrected_name    TEXT NOT NULL,
                total_work_orders INTEGER NOT NULL,
                first_date        TEXT,
                last_date         TEXT,
                related_entities  TEXT NOT NULL,
                tier              TEXT,
                activity_status   TEXT,
                updated_at        TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_dim_entities_kind ON dim_entities(kind);

            CREATE TABLE IF NOT EXISTS fct_work_orders (
                work_order_id      TEXT PRIMARY KEY,
                work_order_number  TEXT,
                builder_key        TEXT,
                project_key        TEXT,
                company_key        TEXT,
                work_date          TEXT,
                completeness_score REAL NOT NULL,
                ml_categorization  TEXT,
                description        TEXT,
                quarantined        INTEGER NOT NULL,
                file_url           TEXT,
                extracted_at       TEXT NOT NULL,
                loaded_at          TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS watermarks (
                target           TEXT PRIMARY KEY,
                max_extracted_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| EngineError::Storage(format!("Failed to initialize schema: {}", e)))?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| EngineError::Storage("Warehouse lock poisoned".to_string()))
    }
}

#[async_trait]
impl WarehouseStore for SqliteWarehouse {
    async fn watermark(&self, target: &str) -> Result<Option<DateTime<Utc>>> {
        let db = self.lock()?;
        let mut stmt = db
            .prepare("SELECT max_extracted_at FROM watermarks WHERE target = ?1")
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        let mut rows = stmt
            .query(params![target])
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        match rows.next().map_err(|e| EngineError::Storage(e.to_string()))? {
            Some(row) => {
                let text: String = row
                    .get(0)
                    .map_err(|e| EngineError::Storage(e.to_string()))?;
                Ok(Some(parse_datetime(&text)?))
            }
            None => Ok(None),
        }
    }

    async fn dimensions(&self) -> Result<Vec<DimensionRow>> {
        let db = self.lock()?;
        let mut stmt = db
            .prepare(
                "SELECT surrogate_key, kind, corrected_name, total_work_orders,
                        first_date, last_date, related_entities, tier,
                        activity_status, updated_at
                 FROM dim_entities",
            )
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map([], dimension_from_row)
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| EngineError::Storage(e.to_string()))?);
        }
        Ok(out)
    }

    async fn facts(&self) -> Result<Vec<FactRow>> {
        let db = self.lock()?;
        let mut stmt = db
            .prepare(
                "SELECT work_order_id, work_order_number, builder_key, project_key,
                        company_key, work_date, completeness_score, ml_categorization,
                        description, quarantined, file_url, extracted_at, loaded_at
                 FROM fct_work_orders",
            )
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map([], fact_from_row)
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| EngineError::Storage(e.to_string()))?);
        }
        Ok(out)
    }

    async fn apply(&self, batch: MergeBatch) -> Result<()> {
        let mut db = self.lock()?;
        let tx = db
            .transaction()
            .map_err(|e| EngineError::Storage(format!("Failed to begin batch: {}", e)))?;

        for dim in &batch.dimensions {
            let related = serde_json::to_string(&dim.related_entities)?;
            tx.execute(
                "INSERT OR REPLACE INTO dim_entities
                 (surrogate_key, kind, corrected_name, total_work_orders,
                  first_date, last_date, related_entities, tier, activity_status, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    dim.surrogate_key.to_string(),
                    dim.kind.as_str(),
                    dim.corrected_name,
                    dim.total_work_orders as i64,
                    dim.first_date.map(|d| d.to_string()),
                    dim.last_date.map(|d| d.to_string()),
                    related,
                    dim.tier,
                    dim.activity_status,
                    dim.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| EngineError::Storage(format!("Dimension upsert failed: {}", e)))?;
        }

        for fact in &batch.facts {
            tx.execute(
                "INSERT OR REPLACE INTO fct_work_orders
                 (work_order_id, work_order_number, builder_key, project_key, company_key,
                  work_date, completeness_score, ml_categorization, description,
                  quarantined, file_url, extracted_at, loaded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    fact.work_order_id,
                    fact.work_order_number,
                    fact.builder_key.map(|k| k.to_string()),
                    fact.project_key.map(|k| k.to_string()),
                    fact.company_key.map(|k| k.to_string()),
                    fact.work_date.map(|d| d.to_string()),
                    fact.completeness_score,
                    fact.ml_categorization,
                    fact.description,
                    fact.quarantined as i64,
                    fact.file_url,
                    fact.extracted_at.to_rfc3339(),
                    fact.loaded_at.to_rfc3339(),
                ],
            )
            .map_err(|e| EngineError::Storage(format!("Fact upsert failed: {}", e)))?;
        }

        if let Some(watermark) = batch.new_watermark {
            tx.execute(
                "INSERT OR REPLACE INTO watermarks (target, max_extracted_at) VALUES (?1, ?2)",
                params![batch.target, watermark.to_rfc3339()],
            )
            .map_err(|e| EngineError::Storage(format!("Watermark advance failed: {}", e)))?;
        }

        tx.commit()
            .map_err(|e| EngineError::Storage(format!("Batch commit failed: {}", e)))
    }
}

fn dimension_from_row(row: &Row<'_>) -> rusqlite::Result<DimensionRow> {
    let key: String = row.get(0)?;
    let kind: String = row.get(1)?;
    let first_date: Option<String> = row.get(4)?;
    let last_date: Option<String> = row.get(5)?;
    let related: String = row.get(6)?;
    let updated_at: String = row.get(9)?;

    Ok(DimensionRow {
        surrogate_key: Uuid::parse_str(&key).unwrap_or_default(),
        kind: EntityKind::parse(&kind).unwrap_or(EntityKind::Builder),
        corrected_name: row.get(2)?,
        total_work_orders: row.get::<_, i64>(3)? as u64,
        first_date: first_date.as_deref().and_then(parse_date),
        last_date: last_date.as_deref().and_then(parse_date),
        related_entities: serde_json::from_str::<BTreeSet<String>>(&related).unwrap_or_default(),
        tier: row.get(7)?,
        activity_status: row.get(8)?,
        updated_at: parse_datetime(&updated_at).unwrap_or_else(|_| Utc::now()),
    })
}

fn fact_from_row(row: &Row<'_>) -> rusqlite::Result<FactRow> {
    let builder_key: Option<String> = row.get(2)?;
    let project_key: Option<String> = row.get(3)?;
    let company_key: Option<String> = row.get(4)?;
    let work_date: Option<String> = row.get(5)?;
    let extracted_at: String = row.get(11)?;
    let loaded_at: String = row.get(12)?;

    Ok(FactRow {
        work_order_id: row.get(0)?,
        work_order_number: row.get(1)?,
        builder_key: builder_key.as_deref().and_then(|k| Uuid::parse_str(k).ok()),
        project_key: project_key.as_deref().and_then(|k| Uuid::parse_str(k).ok()),
        company_key: company_key.as_deref().and_then(|k| Uuid::parse_str(k).ok()),
        work_date: work_date.as_deref().and_then(parse_date),
        completeness_score: row.get(6)?,
        ml_categorization: row.get(7)?,
        description: row.get(8)?,
        quarantined: row.get::<_, i64>(9)? != 0,
        file_url: row.get(10)?,
        extracted_at: parse_datetime(&extracted_at).unwrap_or_else(|_| Utc::now()),
        loaded_at: parse_datetime(&loaded_at).unwrap_or_else(|_| Utc::now()),
    })
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| EngineError::Storage(format!("Bad timestamp in warehouse: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeSet;

    fn sample_batch() -> MergeBatch {
        let extracted = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        MergeBatch {
            target: "fct_work_orders".to_string(),
            dimensions: vec![DimensionRow {
                surrogate_key: Uuid::new_v5(&Uuid::NAMESPACE_OID, b"builder:ASHTON HOMES"),
                kind: EntityKind::Builder,
                corrected_name: "ASHTON HOMES".to_string(),
                total_work_orders: 1,
                first_date: parse_date("2024-01-01"),
                last_date: parse_date("2024-01-01"),
                related_entities: BTreeSet::from(["Pinehurst PH 2".to_string()]),
                tier: Some("Low Volume".to_string()),
                activity_status: Some("Active".to_string()),
                updated_at: extracted,
            }],
            facts: vec![FactRow {
                work_order_id: "WO1".to_string(),
                work_order_number: Some("1042".to_string()),
                builder_key: Some(Uuid::new_v5(&Uuid::NAMESPACE_OID, b"builder:ASHTON HOMES")),
                project_key: None,
                company_key: None,
                work_date: parse_date("2024-01-01"),
                completeness_score: 0.86,
                ml_categorization: Some("Straw Installation".to_string()),
                description: Some("install straw".to_string()),
                quarantined: false,
                file_url: None,
                extracted_at: extracted,
                loaded_at: extracted,
            }],
            new_watermark: Some(extracted),
        }
    }

    #[tokio::test]
    async fn test_batch_roundtrip() {
        let store = SqliteWarehouse::in_memory().unwrap();
        store.apply(sample_batch()).await.unwrap();

        let dims = store.dimensions().await.unwrap();
        assert_eq!(dims.len(), 1);
        assert_eq!(dims[0].corrected_name, "ASHTON HOMES");
        assert_eq!(dims[0].total_related_entities(), 1);

        let facts = store.facts().await.unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].work_order_id, "WO1");
        assert_eq!(
            facts[0].ml_categorization.as_deref(),
            Some("Straw Installation")
        );

        let watermark = store.watermark("fct_work_orders").await.unwrap();
        assert_eq!(watermark, sample_batch().new_watermark);
    }

    #[tokio::test]
    async fn test_replaying_batch_does_not_duplicate() {
        let store = SqliteWarehouse::in_memory().unwrap();
        store.apply(sample_batch()).await.unwrap();
        store.apply(sample_batch()).await.unwrap();

        assert_eq!(store.facts().await.unwrap().len(), 1);
        assert_eq!(store.dimensions().await.unwrap().len(), 1);
    }
}
