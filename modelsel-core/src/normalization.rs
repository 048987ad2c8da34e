//! Normalization engine: population statistics per (endpoint, method, measure).
//!
//! Two phases:
//! 1. **Open**: `observe()` streams samples into running accumulators.
//! 2. **Finalized**: `finalize()` closes every accumulator into a summary.
//!    Factors and normalized scores are only available after this point.
//!
//! The normalization factor is the population mean (default) or the
//! population max. A normalized score of 1.0 means "population-typical".
//!
//! After finalization the engine holds no interior mutability, so a shared
//! reference can be read from many per-triple workers at once.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{EvalMethod, Measure, PerformanceRecord};
use crate::stats::{RunningStats, StatSummary};
use crate::store::PerformanceStore;

/// Which population statistic serves as the normalization factor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationMode {
    #[default]
    Mean,
    Max,
}

impl FromStr for NormalizationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "max" => Ok(Self::Max),
            other => Err(format!("unknown normalization mode '{other}'")),
        }
    }
}

impl fmt::Display for NormalizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mean => f.write_str("mean"),
            Self::Max => f.write_str("max"),
        }
    }
}

/// Errors from the normalization engine.
#[derive(Debug, Error, PartialEq)]
pub enum NormalizationError {
    #[error("normalization factors requested before finalize()")]
    NotFinalized,
    #[error("observe() called after finalize()")]
    AlreadyFinalized,
    #[error("no samples for endpoint '{endpoint}', method {method}, measure {measure}")]
    NoSamples {
        endpoint: String,
        method: EvalMethod,
        measure: Measure,
    },
}

type MethodMeasure = (EvalMethod, Measure);

/// Per-endpoint population statistics for every method and measure.
#[derive(Debug, Clone, Default)]
pub struct NormalizationEngine {
    mode: NormalizationMode,
    open: HashMap<String, HashMap<MethodMeasure, RunningStats>>,
    closed: Option<HashMap<String, HashMap<MethodMeasure, StatSummary>>>,
}

impl NormalizationEngine {
    pub fn new(mode: NormalizationMode) -> Self {
        Self {
            mode,
            open: HashMap::new(),
            closed: None,
        }
    }

    /// Observe every record in the store and finalize.
    pub fn from_store(store: &PerformanceStore, mode: NormalizationMode) -> Self {
        let mut engine = Self::new(mode);
        for method in EvalMethod::ALL {
            for record in store.records(method) {
                // Cannot fail: the engine is still open.
                let _ = engine.observe_record(method, record);
            }
        }
        engine.finalize();
        engine
    }

    pub fn mode(&self) -> NormalizationMode {
        self.mode
    }

    pub fn is_finalized(&self) -> bool {
        self.closed.is_some()
    }

    /// Accumulate one sample. NaN contributes 0.0.
    pub fn observe(
        &mut self,
        endpoint: &str,
        method: EvalMethod,
        measure: Measure,
        value: f64,
    ) -> Result<(), NormalizationError> {
        if self.closed.is_some() {
            return Err(NormalizationError::AlreadyFinalized);
        }
        self.open
            .entry(endpoint.to_string())
            .or_default()
            .entry((method, measure))
            .or_default()
            .push(value);
        Ok(())
    }

    /// Accumulate all six measures of a record.
    pub fn observe_record(
        &mut self,
        method: EvalMethod,
        record: &PerformanceRecord,
    ) -> Result<(), NormalizationError> {
        for measure in Measure::ALL {
            self.observe(&record.endpoint, method, measure, record.value(measure))?;
        }
        Ok(())
    }

    /// Close all accumulators. Calling twice is a no-op.
    pub fn finalize(&mut self) {
        if self.closed.is_some() {
            return;
        }
        let closed: HashMap<String, HashMap<MethodMeasure, StatSummary>> = self
            .open
            .drain()
            .map(|(endpoint, accs)| {
                let summaries = accs.into_iter().map(|(k, s)| (k, s.summary())).collect();
                (endpoint, summaries)
            })
            .collect();
        debug!("normalization finalized for {} endpoints", closed.len());
        self.closed = Some(closed);
    }

    /// Finalized summary of one accumulator.
    pub fn summary(
        &self,
        endpoint: &str,
        method: EvalMethod,
        measure: Measure,
    ) -> Result<&StatSummary, NormalizationError> {
        let closed = self
            .closed
            .as_ref()
            .ok_or(NormalizationError::NotFinalized)?;
        closed
            .get(endpoint)
            .and_then(|m| m.get(&(method, measure)))
            .ok_or_else(|| NormalizationError::NoSamples {
                endpoint: endpoint.to_string(),
                method,
                measure,
            })
    }

    /// The configured statistic (mean or max) for this accumulator.
    pub fn factor(
        &self,
        endpoint: &str,
        method: EvalMethod,
        measure: Measure,
    ) -> Result<f64, NormalizationError> {
        let s = self.summary(endpoint, method, measure)?;
        Ok(match self.mode {
            NormalizationMode::Mean => s.mean,
            NormalizationMode::Max => s.max,
        })
    }

    /// Population-relative score: `raw / factor`.
    ///
    /// Returns NaN when the raw value is missing or the factor is zero, so the
    /// caller's NaN exclusion applies.
    pub fn normalize(
        &self,
        endpoint: &str,
        method: EvalMethod,
        measure: Measure,
        raw: f64,
    ) -> Result<f64, NormalizationError> {
        let factor = self.factor(endpoint, method, measure)?;
        if raw.is_nan() || factor == 0.0 || !factor.is_finite() {
            return Ok(f64::NAN);
        }
        Ok(raw / factor)
    }

    /// Un-normalized population mean, regardless of mode.
    pub fn raw_mean(
        &self,
        endpoint: &str,
        method: EvalMethod,
        measure: Measure,
    ) -> Result<f64, NormalizationError> {
        Ok(self.summary(endpoint, method, measure)?.mean)
    }

    /// Endpoints with finalized statistics, sorted.
    pub fn endpoints(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self
            .closed
            .as_ref()
            .map(|c| c.keys().map(String::as_str).collect())
            .unwrap_or_default();
        out.sort_unstable();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factor_before_finalize_is_error() {
        let mut engine = NormalizationEngine::new(NormalizationMode::Mean);
        engine
            .observe("ep", EvalMethod::Cv, Measure::Auc, 0.7)
            .unwrap();
        assert_eq!(
            engine.factor("ep", EvalMethod::Cv, Measure::Auc),
            Err(NormalizationError::NotFinalized)
        );
    }

    #[test]
    fn observe_after_finalize_is_error() {
        let mut engine = NormalizationEngine::new(NormalizationMode::Mean);
        engine.finalize();
        assert_eq!(
            engine.observe("ep", EvalMethod::Cv, Measure::Auc, 0.7),
            Err(NormalizationError::AlreadyFinalized)
        );
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut engine = NormalizationEngine::new(NormalizationMode::Mean);
        engine
            .observe("ep", EvalMethod::Cv, Measure::Mcc, 0.4)
            .unwrap();
        engine.finalize();
        engine.finalize();
        assert!((engine.factor("ep", EvalMethod::Cv, Measure::Mcc).unwrap() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn mean_and_max_modes() {
        let mut mean = NormalizationEngine::new(NormalizationMode::Mean);
        let mut max = NormalizationEngine::new(NormalizationMode::Max);
        for v in [0.2, 0.4, 0.9] {
            mean.observe("ep", EvalMethod::Test, Measure::Auc, v).unwrap();
            max.observe("ep", EvalMethod::Test, Measure::Auc, v).unwrap();
        }
        mean.finalize();
        max.finalize();
        assert!((mean.factor("ep", EvalMethod::Test, Measure::Auc).unwrap() - 0.5).abs() < 1e-12);
        assert!((max.factor("ep", EvalMethod::Test, Measure::Auc).unwrap() - 0.9).abs() < 1e-12);
        // raw_mean ignores the mode
        assert!((max.raw_mean("ep", EvalMethod::Test, Measure::Auc).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn normalizing_the_factor_yields_one() {
        let mut engine = NormalizationEngine::new(NormalizationMode::Mean);
        for v in [0.61, 0.72, 0.55, 0.80] {
            engine.observe("ep", EvalMethod::Cv, Measure::Auc, v).unwrap();
        }
        engine.finalize();
        let f = engine.factor("ep", EvalMethod::Cv, Measure::Auc).unwrap();
        let n = engine.normalize("ep", EvalMethod::Cv, Measure::Auc, f).unwrap();
        assert!((n - 1.0).abs() < 1e-12);
    }

    #[test]
    fn endpoints_are_separate_populations() {
        let mut engine = NormalizationEngine::new(NormalizationMode::Mean);
        engine.observe("a", EvalMethod::Cv, Measure::Mcc, 0.2).unwrap();
        engine.observe("b", EvalMethod::Cv, Measure::Mcc, 0.8).unwrap();
        engine.finalize();
        assert!((engine.factor("a", EvalMethod::Cv, Measure::Mcc).unwrap() - 0.2).abs() < 1e-12);
        assert!((engine.factor("b", EvalMethod::Cv, Measure::Mcc).unwrap() - 0.8).abs() < 1e-12);
        assert_eq!(engine.endpoints(), vec!["a", "b"]);
    }

    #[test]
    fn missing_key_reports_no_samples() {
        let mut engine = NormalizationEngine::new(NormalizationMode::Mean);
        engine.finalize();
        assert!(matches!(
            engine.factor("nope", EvalMethod::Cv, Measure::Mcc),
            Err(NormalizationError::NoSamples { .. })
        ));
    }

    #[test]
    fn zero_factor_normalizes_to_nan() {
        let mut engine = NormalizationEngine::new(NormalizationMode::Mean);
        engine.observe("ep", EvalMethod::Cv, Measure::Mcc, 0.0).unwrap();
        engine.finalize();
        assert!(engine
            .normalize("ep", EvalMethod::Cv, Measure::Mcc, 0.3)
            .unwrap()
            .is_nan());
    }

    #[test]
    fn mode_parses() {
        assert_eq!("MAX".parse::<NormalizationMode>().unwrap(), NormalizationMode::Max);
        assert!("median".parse::<NormalizationMode>().is_err());
    }
}
