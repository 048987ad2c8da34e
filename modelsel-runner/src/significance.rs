//! Significance estimator: how much better than a random pick the shortlist
//! did on held-out data.
//!
//! For each depth d in 1..=min(k, shortlist length):
//! - **actual**: mean reward over the test records of the top-d members;
//! - **random**: mean reward over every test record of the endpoint (the raw
//!   population mean from the normalization engine);
//! - **ratio**: actual / random;
//! - **p-value**: fraction of `n_resamples` draws of d background rewards
//!   (with replacement) whose mean meets or exceeds the actual mean.
//!
//! Each triple resamples from its own RNG stream, seeded from the run's
//! master seed and the triple key, and the seed is reported.

use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};

use modelsel_core::domain::{EvalMethod, TripleKey};
use modelsel_core::normalization::{NormalizationEngine, NormalizationError};
use modelsel_core::rng::SeedHierarchy;
use modelsel_core::store::{PerformanceStore, TripleSlice};

use crate::measures::RewardMeasure;
use crate::ranking::Shortlist;
use crate::strategy::RankingStrategy;

/// Result at one shortlist depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthSignificance {
    pub depth: usize,
    pub actual: f64,
    pub random: f64,
    pub ratio: f64,
    pub p_value: f64,
}

/// Per-depth table for one triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignificanceReport {
    pub key: TripleKey,
    pub strategy: RankingStrategy,
    pub reward: RewardMeasure,
    pub n_resamples: usize,
    pub seed: u64,
    pub depths: Vec<DepthSignificance>,
}

pub struct SignificanceEstimator<'a> {
    store: &'a PerformanceStore,
    normalization: &'a NormalizationEngine,
    reward: RewardMeasure,
    n_resamples: usize,
    seeds: SeedHierarchy,
}

impl<'a> SignificanceEstimator<'a> {
    pub fn new(
        store: &'a PerformanceStore,
        normalization: &'a NormalizationEngine,
        reward: RewardMeasure,
        n_resamples: usize,
        seeds: SeedHierarchy,
    ) -> Self {
        Self {
            store,
            normalization,
            reward,
            n_resamples,
            seeds,
        }
    }

    /// Reward of every test record of `endpoint`. Missing values count as 0,
    /// as they do in the population mean.
    pub fn background(&self, endpoint: &str) -> Vec<f64> {
        self.store
            .records(EvalMethod::Test)
            .iter()
            .filter(|r| r.endpoint == endpoint)
            .map(|r| {
                self.reward
                    .test_measures()
                    .iter()
                    .map(|m| zero_if_nan(r.value(*m)))
                    .sum()
            })
            .collect()
    }

    /// Per-depth table, or `None` when the endpoint has no test records.
    pub fn estimate(
        &self,
        shortlist: &Shortlist,
        slice: &TripleSlice<'_>,
        k: usize,
    ) -> Result<Option<SignificanceReport>, NormalizationError> {
        let key = &shortlist.key;
        let background = self.background(&key.endpoint);
        if background.is_empty() {
            debug!("{key}: no test records for endpoint, significance skipped");
            return Ok(None);
        }
        let random = self.reward.background_mean(self.normalization, &key.endpoint)?;

        let seed = self.seeds.sub_seed(key);
        let mut rng = self.seeds.rng_for(key);
        let max_depth = k.min(shortlist.len());

        let depths = (1..=max_depth)
            .map(|depth| {
                let rewards: Vec<f64> = shortlist
                    .top(depth)
                    .iter()
                    .filter_map(|e| slice.test(&e.model_id))
                    .map(|r| zero_if_nan(self.reward.test_reward(&r.values)))
                    .collect();
                let actual = mean(&rewards);
                let ratio = if random == 0.0 { f64::NAN } else { actual / random };
                let p_value = resample_p_value(&background, depth, actual, self.n_resamples, &mut rng);
                DepthSignificance {
                    depth,
                    actual,
                    random,
                    ratio,
                    p_value,
                }
            })
            .collect();

        Ok(Some(SignificanceReport {
            key: key.clone(),
            strategy: shortlist.strategy,
            reward: self.reward,
            n_resamples: self.n_resamples,
            seed,
            depths,
        }))
    }
}

/// Missing test measures count as 0 on both sides of the ratio.
fn zero_if_nan(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Fraction of `n_resamples` random draws of `depth` background values (with
/// replacement) whose mean is at least `actual`. NaN when it cannot be
/// estimated.
pub fn resample_p_value<R: Rng>(
    background: &[f64],
    depth: usize,
    actual: f64,
    n_resamples: usize,
    rng: &mut R,
) -> f64 {
    if background.is_empty() || depth == 0 || n_resamples == 0 || actual.is_nan() {
        return f64::NAN;
    }
    let mut at_least_actual = 0usize;
    for _ in 0..n_resamples {
        let sum: f64 = (0..depth)
            .map(|_| background[rng.gen_range(0..background.len())])
            .sum();
        if sum / depth as f64 >= actual {
            at_least_actual += 1;
        }
    }
    at_least_actual as f64 / n_resamples as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::ShortlistEntry;
    use modelsel_core::domain::{Measure, PerformanceRecord};
    use modelsel_core::normalization::NormalizationMode;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn test_rec(id: &str, auc: f64) -> PerformanceRecord {
        PerformanceRecord::new(id, "org", "ds", "ep")
            .with(Measure::Auc, auc)
            .with(Measure::Mcc, 0.0)
    }

    fn shortlist(ids: &[&str]) -> Shortlist {
        Shortlist {
            key: TripleKey::new("org", "ds", "ep"),
            strategy: RankingStrategy::Cv,
            entries: ids
                .iter()
                .enumerate()
                .map(|(i, id)| ShortlistEntry {
                    model_id: id.to_string(),
                    score: -(i as f64),
                })
                .collect(),
        }
    }

    fn store(records: Vec<PerformanceRecord>) -> PerformanceStore {
        let mut store = PerformanceStore::new();
        for r in records {
            store.insert(EvalMethod::Test, r).unwrap();
        }
        store
    }

    #[test]
    fn ratio_against_background_mean() {
        let store = store(vec![test_rec("A", 0.9), test_rec("B", 0.3)]);
        let norm = NormalizationEngine::from_store(&store, NormalizationMode::Mean);
        let est = SignificanceEstimator::new(
            &store,
            &norm,
            RewardMeasure::Auc,
            2000,
            SeedHierarchy::new(42),
        );
        let list = shortlist(&["A"]);
        let slice = store.slice(&list.key);
        let report = est.estimate(&list, &slice, 10).unwrap().unwrap();

        assert_eq!(report.depths.len(), 1);
        let d1 = &report.depths[0];
        assert!((d1.actual - 0.9).abs() < 1e-10);
        assert!((d1.random - 0.6).abs() < 1e-10);
        assert!((d1.ratio - 1.5).abs() < 1e-10);
        // Half the background meets 0.9
        assert!(d1.p_value > 0.4 && d1.p_value < 0.6, "p = {}", d1.p_value);
        assert_eq!(report.seed, SeedHierarchy::new(42).sub_seed(&list.key));
    }

    #[test]
    fn depths_stop_at_k_and_shortlist_length() {
        let store = store(vec![
            test_rec("A", 0.9),
            test_rec("B", 0.7),
            test_rec("C", 0.5),
        ]);
        let norm = NormalizationEngine::from_store(&store, NormalizationMode::Mean);
        let est =
            SignificanceEstimator::new(&store, &norm, RewardMeasure::Auc, 10, SeedHierarchy::new(1));
        let list = shortlist(&["A", "B", "C"]);
        let slice = store.slice(&list.key);

        let report = est.estimate(&list, &slice, 2).unwrap().unwrap();
        assert_eq!(report.depths.len(), 2);
        assert!((report.depths[1].actual - 0.8).abs() < 1e-10);

        let report = est.estimate(&list, &slice, 10).unwrap().unwrap();
        assert_eq!(report.depths.len(), 3);
    }

    #[test]
    fn members_without_test_records_are_skipped() {
        let store = store(vec![test_rec("A", 0.8), test_rec("B", 0.4)]);
        let norm = NormalizationEngine::from_store(&store, NormalizationMode::Mean);
        let est =
            SignificanceEstimator::new(&store, &norm, RewardMeasure::Auc, 10, SeedHierarchy::new(1));
        let list = shortlist(&["X", "A"]);
        let slice = store.slice(&list.key);
        let report = est.estimate(&list, &slice, 5).unwrap().unwrap();
        assert!(report.depths[0].actual.is_nan());
        assert!(report.depths[0].p_value.is_nan());
        assert!((report.depths[1].actual - 0.8).abs() < 1e-10);
    }

    #[test]
    fn missing_test_measure_counts_as_zero() {
        let store = store(vec![
            test_rec("A", 0.9),
            PerformanceRecord::new("B", "org", "ds", "ep"),
        ]);
        let norm = NormalizationEngine::from_store(&store, NormalizationMode::Mean);
        let est =
            SignificanceEstimator::new(&store, &norm, RewardMeasure::Auc, 10, SeedHierarchy::new(1));
        let list = shortlist(&["A", "B"]);
        let slice = store.slice(&list.key);
        let report = est.estimate(&list, &slice, 5).unwrap().unwrap();
        let d2 = &report.depths[1];
        assert!((d2.actual - 0.45).abs() < 1e-10);
        assert!((d2.random - 0.45).abs() < 1e-10);
        assert!((d2.ratio - 1.0).abs() < 1e-10);
    }

    #[test]
    fn no_background_means_no_report() {
        let store = PerformanceStore::new();
        let norm = NormalizationEngine::from_store(&store, NormalizationMode::Mean);
        let est =
            SignificanceEstimator::new(&store, &norm, RewardMeasure::Auc, 10, SeedHierarchy::new(1));
        let list = shortlist(&["A"]);
        let slice = store.slice(&list.key);
        assert!(est.estimate(&list, &slice, 5).unwrap().is_none());
    }

    #[test]
    fn p_value_counts_resamples() {
        let mut rng = StdRng::seed_from_u64(9);
        // Nothing in the background reaches 1.0
        assert_eq!(resample_p_value(&[0.2, 0.4], 1, 1.0, 100, &mut rng), 0.0);
        // Everything reaches 0.1
        assert_eq!(resample_p_value(&[0.2, 0.4], 3, 0.1, 100, &mut rng), 1.0);
        assert!(resample_p_value(&[0.2], 1, 0.1, 0, &mut rng).is_nan());
        assert!(resample_p_value(&[], 1, 0.1, 10, &mut rng).is_nan());
    }

    #[test]
    fn resampling_is_reproducible() {
        let bg: Vec<f64> = (0..50).map(|i| i as f64 / 50.0).collect();
        let a = resample_p_value(&bg, 3, 0.6, 500, &mut StdRng::seed_from_u64(5));
        let b = resample_p_value(&bg, 3, 0.6, 500, &mut StdRng::seed_from_u64(5));
        assert_eq!(a, b);
        assert!((0.0..=1.0).contains(&a));
    }

    #[test]
    fn background_counts_missing_as_zero() {
        let store = store(vec![
            test_rec("A", 0.8),
            PerformanceRecord::new("B", "org", "ds", "ep"),
        ]);
        let norm = NormalizationEngine::from_store(&store, NormalizationMode::Mean);
        let est = SignificanceEstimator::new(
            &store,
            &norm,
            RewardMeasure::MccAuc,
            10,
            SeedHierarchy::new(1),
        );
        assert_eq!(est.background("ep"), vec![0.8, 0.0]);
        assert!((RewardMeasure::MccAuc.background_mean(&norm, "ep").unwrap() - 0.4).abs() < 1e-10);
    }
}
