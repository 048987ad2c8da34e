//! modelsel runner: ranking strategies, outlier detection, significance
//! estimation and reports.
//!
//! This crate builds on `modelsel-core` to provide:
//! - Run configuration (TOML + overrides)
//! - Composite and reward measures
//! - Bounded top-k selection
//! - The color outlier detector and pre-fit linear predictors
//! - The ranking engine with per-strategy scoring
//! - Resampling significance estimation
//! - Tab-separated reports, the run manifest and the parallel pipeline

pub mod color;
pub mod config;
pub mod linear_model;
pub mod measures;
pub mod pipeline;
pub mod ranking;
pub mod report;
pub mod significance;
pub mod strategy;
pub mod topk;

pub use color::{ColorParams, ColorPoint, ColorVerdict};
pub use config::{ConfigError, SelectionConfig};
pub use linear_model::{LinearModel, ModelVariant, UnmatchedLevel};
pub use measures::{CompositeMeasure, RewardMeasure};
pub use pipeline::{run_selection, run_to_dir, PipelineError, RunManifest, RunSummary, TripleSummary};
pub use ranking::{
    Exclusion, ExclusionCounts, RankContext, RankError, RankOutcome, RankingEngine, Shortlist,
    ShortlistEntry,
};
pub use report::{
    read_ranked_report, read_significance_report, RankedRow, ReportError, ReportWriter,
    SignificanceRow,
};
pub use significance::{DepthSignificance, SignificanceEstimator, SignificanceReport};
pub use strategy::RankingStrategy;
pub use topk::{BoundedTopK, InsertResult};
