//! In-memory warehouse store, for tests and dry runs

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::warehouse::{DimensionRow, FactRow, MergeBatch, WarehouseStore};

#[derive(Default)]
struct State {
    dimensions: HashMap<Uuid, DimensionRow>,
    facts: HashMap<String, FactRow>,
    watermarks: HashMap<String, DateTime<Utc>>,
}

/// Keeps the whole warehouse behind one lock; `apply` swaps state in a
/// single critical section, which makes the batch trivially atomic.
#[derive(Default)]
pub struct MemoryWarehouse {
    state: Mutex<State>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WarehouseStore for MemoryWarehouse {
    async fn watermark(&self, target: &str) -> Result<Option<DateTime<Utc>>> {
        let state = self.lock()?;
        Ok(state.watermarks.get(target).copied())
    }

    async fn dimensions(&self) -> Result<Vec<DimensionRow>> {
        let state = self.lock()?;
        Ok(state.dimensions.values().cloned().collect())
    }

    async fn facts(&self) -> Result<Vec<FactRow>> {
        let state = self.lock()?;
        Ok(state.facts.values().cloned().collect())
    }

    async fn apply(&self, batch: MergeBatch) -> Result<()> {
        let mut state = self.lock()?;
        for dim in batch.dimensions {
            state.dimensions.insert(dim.surrogate_key, dim);
        }
        for fact in batch.facts {
            // Replace in place: the fact table never holds two rows with
            // the same work_order_id
            state.facts.insert(fact.work_order_id.clone(), fact);
        }
        if let Some(watermark) = batch.new_watermark {
            state.watermarks.insert(batch.target, watermark);
        }
        Ok(())
    }
}

impl MemoryWarehouse {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| EngineError::Storage("Warehouse lock poisoned".to_string()))
    }
}
