//! Categorization Router - dispatches records to company-specific strategies
//!
//! Routing is a pure function of company identity through a fixed table;
//! adding a company is a table edit, not a new branch. Strategies share one
//! `categorize` contract and always emit labels from their closed sets.

pub mod categories;
pub mod semantic;
pub mod strict;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::record::CategorizationResult;

pub use categories::UNCATEGORIZED;
pub use semantic::SemanticOverlapStrategy;
pub use strict::StrictKeywordStrategy;

/// Uniform contract every categorization strategy implements
pub trait CategoryStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// The closed category set this strategy draws from
    fn categories(&self) -> &[&'static str];

    fn categorize(&self, text: &str) -> CategorizationResult;
}

/// Strategy variants the routing table can reference
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    StrictKeyword,
    SemanticOverlap,
}

/// One routing table entry: a standardized company name and its strategy
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteEntry {
    pub company: String,
    pub strategy: StrategyKind,
}

/// Dispatches records to strategies by company identity.
pub struct CategorizationRouter {
    routes: HashMap<String, Arc<dyn CategoryStrategy>>,
}

impl CategorizationRouter {
    /// Build a router from routing-table entries. Strategy instances are
    /// shared across companies that use the same variant.
    pub fn from_routes(routes: &[RouteEntry], semantic_threshold: f64) -> Self {
        let strict: Arc<dyn CategoryStrategy> = Arc::new(StrictKeywordStrategy::aeon());
        let semantic: Arc<dyn CategoryStrategy> =
            Arc::new(SemanticOverlapStrategy::ae3(semantic_threshold));

        let mut table = HashMap::new();
        for entry in routes {
            let strategy = match entry.strategy {
                StrategyKind::StrictKeyword => Arc::clone(&strict),
                StrategyKind::SemanticOverlap => Arc::clone(&semantic),
            };
            table.insert(entry.company.clone(), strategy);
        }
        Self { routes: table }
    }

    /// The reference routing table.
    pub fn default_routes() -> Vec<RouteEntry> {
        vec![
            RouteEntry {
                company: "Aeon Landscaping".to_string(),
                strategy: StrategyKind::StrictKeyword,
            },
            RouteEntry {
                company: "AE3 Excavating".to_string(),
                strategy: StrategyKind::SemanticOverlap,
            },
        ]
    }

    /// Categorize a record's text for the given company identity. Companies
    /// without a routing entry resolve to "Uncategorized" under the "none"
    /// strategy rather than failing.
    pub fn categorize(&self, company: Option<&str>, text: &str) -> CategorizationResult {
        let Some(strategy) = company.and_then(|c| self.routes.get(c)) else {
            debug!(company = company.unwrap_or("<none>"), "No categorizer routed");
            return CategorizationResult {
                category_label: UNCATEGORIZED.to_string(),
                strategy_used: "none".to_string(),
                match_score: None,
            };
        };
        strategy.categorize(text)
    }
}
