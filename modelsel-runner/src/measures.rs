//! Score functions over performance records.
//!
//! - [`CompositeMeasure`]: the "chosen performance measure" evaluated on a CV
//!   or CVCF record by the CV-family strategies.
//! - [`RewardMeasure`]: the measure the COLOR strategy scores with, and the
//!   measure the significance estimator judges test records by.
//!
//! Both are picked once per run from configuration. Names are
//! SCREAMING_SNAKE_CASE and parse case-insensitively, with `-`/`+` accepted
//! in place of `_`.

use std::fmt;
use std::str::FromStr;

use modelsel_core::domain::{EvalMethod, Measure, MeasureSet};
use modelsel_core::normalization::{NormalizationEngine, NormalizationError};
use serde::{Deserialize, Serialize};

/// Look a name up in a closed table of variants.
pub(crate) fn parse_named<T: Copy>(
    all: &[T],
    name_of: impl Fn(&T) -> &'static str,
    kind: &str,
    input: &str,
) -> Result<T, String> {
    let wanted = input.trim().to_ascii_uppercase().replace(['-', '+'], "_");
    all.iter()
        .copied()
        .find(|v| name_of(v) == wanted)
        .ok_or_else(|| {
            let known: Vec<&str> = all.iter().map(&name_of).collect();
            format!("unknown {kind} '{input}' (expected one of {})", known.join(", "))
        })
}

/// NaN-propagating minimum. `f64::min` would silently drop the NaN side.
fn min_or_nan(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.min(b)
    }
}

// ─── Composite measure ───────────────────────────────────────────────

/// Scalar composite of one record's measures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum CompositeMeasure {
    Mcc,
    Auc,
    #[default]
    MccAuc,
    MccMinusSd,
    AucMinusSd,
    MccAucMinusSd,
    Accuracy,
    Sensitivity,
    Specificity,
}

impl CompositeMeasure {
    pub const ALL: [CompositeMeasure; 9] = [
        Self::Mcc,
        Self::Auc,
        Self::MccAuc,
        Self::MccMinusSd,
        Self::AucMinusSd,
        Self::MccAucMinusSd,
        Self::Accuracy,
        Self::Sensitivity,
        Self::Specificity,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Mcc => "MCC",
            Self::Auc => "AUC",
            Self::MccAuc => "MCC_AUC",
            Self::MccMinusSd => "MCC_MINUS_SD",
            Self::AucMinusSd => "AUC_MINUS_SD",
            Self::MccAucMinusSd => "MCC_AUC_MINUS_SD",
            Self::Accuracy => "ACCURACY",
            Self::Sensitivity => "SENSITIVITY",
            Self::Specificity => "SPECIFICITY",
        }
    }

    /// Evaluate on a record's values and standard deviations.
    ///
    /// Penalized variants subtract the matching standard deviations; a missing
    /// standard deviation makes the score NaN.
    pub fn extract(&self, values: &MeasureSet, sds: &MeasureSet) -> f64 {
        match self {
            Self::Mcc => values.mcc,
            Self::Auc => values.auc,
            Self::MccAuc => values.mcc + values.auc,
            Self::MccMinusSd => values.mcc - sds.mcc,
            Self::AucMinusSd => values.auc - sds.auc,
            Self::MccAucMinusSd => values.mcc + values.auc - sds.mcc - sds.auc,
            Self::Accuracy => values.accuracy,
            Self::Sensitivity => values.sensitivity,
            Self::Specificity => values.specificity,
        }
    }
}

impl fmt::Display for CompositeMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CompositeMeasure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_named(&Self::ALL, Self::name, "composite measure", s)
    }
}

impl TryFrom<String> for CompositeMeasure {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

// ─── Reward measure ──────────────────────────────────────────────────

/// Reward used by COLOR scoring and by the significance estimator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum RewardMeasure {
    Mcc,
    Auc,
    #[default]
    MccAuc,
    MinAuc,
    MinMcc,
    MinMccAuc,
}

impl RewardMeasure {
    pub const ALL: [RewardMeasure; 6] = [
        Self::Mcc,
        Self::Auc,
        Self::MccAuc,
        Self::MinAuc,
        Self::MinMcc,
        Self::MinMccAuc,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Mcc => "MCC",
            Self::Auc => "AUC",
            Self::MccAuc => "MCC_AUC",
            Self::MinAuc => "MIN_AUC",
            Self::MinMcc => "MIN_MCC",
            Self::MinMccAuc => "MIN_MCC_AUC",
        }
    }

    /// Measures summed to form the reward of a single (test) record.
    ///
    /// The min-based rewards need two records; on a single record they
    /// reduce to the plain measures.
    pub fn test_measures(&self) -> &'static [Measure] {
        match self {
            Self::Mcc | Self::MinMcc => &[Measure::Mcc],
            Self::Auc | Self::MinAuc => &[Measure::Auc],
            Self::MccAuc | Self::MinMccAuc => &[Measure::Mcc, Measure::Auc],
        }
    }

    /// Reward of a candidate from its CV and CVCF records.
    ///
    /// Single-measure rewards read the CVCF record.
    pub fn color_reward(&self, cv: &MeasureSet, cvcf: &MeasureSet) -> f64 {
        match self {
            Self::Mcc => cvcf.mcc,
            Self::Auc => cvcf.auc,
            Self::MccAuc => cvcf.mcc + cvcf.auc,
            Self::MinAuc => min_or_nan(cv.auc, cvcf.auc),
            Self::MinMcc => min_or_nan(cv.mcc, cvcf.mcc),
            Self::MinMccAuc => min_or_nan(cv.mcc, cvcf.mcc) + min_or_nan(cv.auc, cvcf.auc),
        }
    }

    /// Reward of one held-out test record.
    pub fn test_reward(&self, test: &MeasureSet) -> f64 {
        self.test_measures().iter().map(|m| test.get(*m)).sum()
    }

    /// Background expectation: the raw population mean reward over every
    /// test record of the endpoint.
    pub fn background_mean(
        &self,
        normalization: &NormalizationEngine,
        endpoint: &str,
    ) -> Result<f64, NormalizationError> {
        self.test_measures().iter().try_fold(0.0, |acc, m| {
            Ok(acc + normalization.raw_mean(endpoint, EvalMethod::Test, *m)?)
        })
    }
}

impl fmt::Display for RewardMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RewardMeasure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_named(&Self::ALL, Self::name, "reward measure", s)
    }
}

impl TryFrom<String> for RewardMeasure {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}
