//! modelsel core: domain types, record store, streaming statistics,
//! normalization and seed derivation.
//!
//! - Domain types (performance records, measures, model conditions, keys)
//! - Performance store with per-triple slices and the JSON snapshot boundary
//! - Two-phase normalization engine (observe, then finalize)
//! - BLAKE3 seed hierarchy for reproducible resampling

pub mod domain;
pub mod normalization;
pub mod rng;
pub mod stats;
pub mod store;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything shared across per-triple workers is
    /// Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::PerformanceRecord>();
        require_sync::<domain::PerformanceRecord>();
        require_send::<domain::ModelCondition>();
        require_sync::<domain::ModelCondition>();
        require_send::<domain::TripleKey>();
        require_sync::<domain::TripleKey>();
        require_send::<domain::MeasureSet>();
        require_sync::<domain::MeasureSet>();

        require_send::<store::PerformanceStore>();
        require_sync::<store::PerformanceStore>();
        require_send::<store::TripleSlice<'static>>();
        require_sync::<store::TripleSlice<'static>>();
        require_send::<store::EngineInputs>();
        require_sync::<store::EngineInputs>();

        require_send::<normalization::NormalizationEngine>();
        require_sync::<normalization::NormalizationEngine>();
        require_send::<stats::RunningStats>();
        require_sync::<stats::RunningStats>();

        require_send::<rng::SeedHierarchy>();
        require_sync::<rng::SeedHierarchy>();
    }
}
