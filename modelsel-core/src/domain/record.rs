//! PerformanceRecord: one measurement of one model under one evaluation method.

use serde::{Deserialize, Serialize};

use super::ids::{ModelId, TripleKey};
use super::measure::{Measure, MeasureSet};

/// Performance of one model, for one (organization, dataset, endpoint), under
/// one evaluation method. Which method is implied by the store list holding it.
///
/// Created once by the loader and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    // ── Identity ──
    pub model_id: ModelId,
    pub organization: String,
    pub dataset: String,
    pub endpoint: String,

    // ── Measures ──
    #[serde(default)]
    pub values: MeasureSet,
    /// Standard deviations matching `values` (across CV folds/repeats).
    #[serde(default)]
    pub std_devs: MeasureSet,

    // ── Metadata ──
    /// Number of features the model actually used; -1 if unknown.
    #[serde(default = "unknown_feature_count")]
    pub actual_feature_count: i32,
    /// Position in an externally supplied ranking (1 = best).
    #[serde(default)]
    pub submission_rank: Option<u32>,
    /// Opaque passthrough label carried into reports.
    #[serde(default)]
    pub excel_column_label: String,
}

fn unknown_feature_count() -> i32 {
    -1
}

impl PerformanceRecord {
    /// A record with every measure missing.
    pub fn new(
        model_id: impl Into<ModelId>,
        organization: impl Into<String>,
        dataset: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            organization: organization.into(),
            dataset: dataset.into(),
            endpoint: endpoint.into(),
            values: MeasureSet::missing(),
            std_devs: MeasureSet::missing(),
            actual_feature_count: -1,
            submission_rank: None,
            excel_column_label: String::new(),
        }
    }

    /// Builder-style setter for a measure value.
    pub fn with(mut self, measure: Measure, value: f64) -> Self {
        self.values.set(measure, value);
        self
    }

    /// Builder-style setter for a measure standard deviation.
    pub fn with_sd(mut self, measure: Measure, sd: f64) -> Self {
        self.std_devs.set(measure, sd);
        self
    }

    pub fn with_submission_rank(mut self, rank: u32) -> Self {
        self.submission_rank = Some(rank);
        self
    }

    pub fn value(&self, measure: Measure) -> f64 {
        self.values.get(measure)
    }

    pub fn std_dev(&self, measure: Measure) -> f64 {
        self.std_devs.get(measure)
    }

    pub fn triple(&self) -> TripleKey {
        TripleKey::new(
            self.organization.clone(),
            self.dataset.clone(),
            self.endpoint.clone(),
        )
    }

    pub fn belongs_to(&self, key: &TripleKey) -> bool {
        self.organization == key.organization
            && self.dataset == key.dataset
            && self.endpoint == key.endpoint
    }
}
