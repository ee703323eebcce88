//! Warehouse store seam - dimension and fact rows behind an async trait
//!
//! The merge engine computes rows; a `WarehouseStore` persists them. The one
//! hard requirement on implementations: `apply` is atomic per batch. Either
//! every row and the watermark advance land, or the store is left in its
//! pre-batch state.

pub mod memory;
pub mod sqlite;

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::registry::EntityKind;

pub use memory::MemoryWarehouse;
pub use sqlite::SqliteWarehouse;

/// One canonical entity with its incrementally-maintained aggregates.
/// Never deleted; updated as new batches arrive.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DimensionRow {
    /// Deterministic key derived from the corrected name
    pub surrogate_key: Uuid,

    pub kind: EntityKind,
    pub corrected_name: String,

    pub total_work_orders: u64,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,

    /// Corrected names of entities seen together with this one
    /// (projects for a builder, builders for a project or company).
    /// A set, so replays cannot inflate the count.
    pub related_entities: BTreeSet<String>,

    /// Volume tier, recomputed from aggregates on every merge (builders)
    pub tier: Option<String>,

    /// Recency classification, recomputed on every merge
    pub activity_status: Option<String>,

    pub updated_at: DateTime<Utc>,
}

impl DimensionRow {
    pub fn total_related_entities(&self) -> u64 {
        self.related_entities.len() as u64
    }
}

/// One resolved work order in the fact table, keyed by `work_order_id`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FactRow {
    pub work_order_id: String,
    pub work_order_number: Option<String>,

    pub builder_key: Option<Uuid>,
    pub project_key: Option<Uuid>,
    pub company_key: Option<Uuid>,

    pub work_date: Option<NaiveDate>,
    pub completeness_score: f64,
    pub ml_categorization: Option<String>,
    pub description: Option<String>,

    /// Set when builder and company both failed to resolve; the row still
    /// merges so nothing is silently dropped
    pub quarantined: bool,

    pub file_url: Option<String>,
    pub extracted_at: DateTime<Utc>,
    pub loaded_at: DateTime<Utc>,
}

/// Everything one merge run wants persisted, as a single atomic unit
#[derive(Clone, Debug)]
pub struct MergeBatch {
    /// Watermark key this batch advances
    pub target: String,

    /// Dimension rows touched by the batch (full updated rows, not deltas)
    pub dimensions: Vec<DimensionRow>,

    pub facts: Vec<FactRow>,

    /// Maximum `extracted_at` in the batch; `None` when the batch was empty
    pub new_watermark: Option<DateTime<Utc>>,
}

impl MergeBatch {
    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty() && self.facts.is_empty()
    }
}

/// Storage contract for the incremental merge engine.
#[async_trait]
pub trait WarehouseStore: Send + Sync {
    /// The maximum `extracted_at` already merged into `target`
    async fn watermark(&self, target: &str) -> Result<Option<DateTime<Utc>>>;

    async fn dimensions(&self) -> Result<Vec<DimensionRow>>;

    async fn facts(&self) -> Result<Vec<FactRow>>;

    /// Upsert dimensions and facts and advance the watermark, atomically.
    /// On error the store must be left in its pre-batch state.
    async fn apply(&self, batch: MergeBatch) -> Result<()>;
}
