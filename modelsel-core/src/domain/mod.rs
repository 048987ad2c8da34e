//! Domain types: performance records, measures, evaluation methods, model conditions.

pub mod condition;
pub mod ids;
pub mod measure;
pub mod record;

pub use condition::{attr, ModelCondition, ModelConditions};
pub use ids::{DatasetEndpoint, ModelId, TripleKey};
pub use measure::{EvalMethod, Measure, MeasureSet};
pub use record::PerformanceRecord;
