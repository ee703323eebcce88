pub mod categorize;
pub mod completeness;
pub mod config;
pub mod correction;
pub mod error;
pub mod ingestion;
pub mod merge;
pub mod normalize;
pub mod pipeline;
pub mod quality;
pub mod record;
pub mod registry;
pub mod warehouse;

pub use error::{EngineError, Result};
pub use pipeline::{RunReport, WorkOrderPipeline};
pub use record::{CategorizationResult, CorrectionResult, MatchMethod, RawRecord, ResolvedRecord};
pub use registry::{CanonicalRegistry, EntityKind};
