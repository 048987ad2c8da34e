//! Performance measures and evaluation protocols.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the six scalar performance measures reported per model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Measure {
    Mcc,
    Accuracy,
    Sensitivity,
    Specificity,
    Auc,
    Rmse,
}

impl Measure {
    pub const ALL: [Measure; 6] = [
        Measure::Mcc,
        Measure::Accuracy,
        Measure::Sensitivity,
        Measure::Specificity,
        Measure::Auc,
        Measure::Rmse,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Mcc => "mcc",
            Self::Accuracy => "accuracy",
            Self::Sensitivity => "sensitivity",
            Self::Specificity => "specificity",
            Self::Auc => "auc",
            Self::Rmse => "rmse",
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Measure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Measure::ALL
            .iter()
            .copied()
            .find(|m| m.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown measure '{s}'"))
    }
}

/// Evaluation protocol a record was measured under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvalMethod {
    /// Plain k-fold cross-validation.
    Cv,
    /// Cross-validation after consensus-feature refinement.
    Cvcf,
    /// Independent held-out test set.
    Test,
}

impl EvalMethod {
    pub const ALL: [EvalMethod; 3] = [EvalMethod::Cv, EvalMethod::Cvcf, EvalMethod::Test];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Cv => "CV",
            Self::Cvcf => "CVCF",
            Self::Test => "TEST",
        }
    }
}

impl fmt::Display for EvalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The six measures as a value bundle. Missing values are NaN.
///
/// In JSON a missing value is `null` (serde_json writes NaN as `null`), so
/// deserialization maps `null` and absent fields back to NaN.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasureSet {
    #[serde(default = "nan", deserialize_with = "nan_if_null")]
    pub mcc: f64,
    #[serde(default = "nan", deserialize_with = "nan_if_null")]
    pub accuracy: f64,
    #[serde(default = "nan", deserialize_with = "nan_if_null")]
    pub sensitivity: f64,
    #[serde(default = "nan", deserialize_with = "nan_if_null")]
    pub specificity: f64,
    #[serde(default = "nan", deserialize_with = "nan_if_null")]
    pub auc: f64,
    #[serde(default = "nan", deserialize_with = "nan_if_null")]
    pub rmse: f64,
}

impl Default for MeasureSet {
    fn default() -> Self {
        Self::missing()
    }
}

impl MeasureSet {
    /// All measures unavailable.
    pub fn missing() -> Self {
        Self {
            mcc: f64::NAN,
            accuracy: f64::NAN,
            sensitivity: f64::NAN,
            specificity: f64::NAN,
            auc: f64::NAN,
            rmse: f64::NAN,
        }
    }

    pub fn get(&self, measure: Measure) -> f64 {
        match measure {
            Measure::Mcc => self.mcc,
            Measure::Accuracy => self.accuracy,
            Measure::Sensitivity => self.sensitivity,
            Measure::Specificity => self.specificity,
            Measure::Auc => self.auc,
            Measure::Rmse => self.rmse,
        }
    }

    pub fn set(&mut self, measure: Measure, value: f64) {
        match measure {
            Measure::Mcc => self.mcc = value,
            Measure::Accuracy => self.accuracy = value,
            Measure::Sensitivity => self.sensitivity = value,
            Measure::Specificity => self.specificity = value,
            Measure::Auc => self.auc = value,
            Measure::Rmse => self.rmse = value,
        }
    }

    /// Apply `f` to every measure, producing a new set.
    pub fn map(&self, mut f: impl FnMut(Measure, f64) -> f64) -> Self {
        let mut out = *self;
        for m in Measure::ALL {
            out.set(m, f(m, self.get(m)));
        }
        out
    }

    /// Elementwise minimum. A NaN on either side yields NaN for that measure.
    pub fn elementwise_min(&self, other: &MeasureSet) -> Self {
        self.map(|m, a| {
            let b = other.get(m);
            if a.is_nan() || b.is_nan() {
                f64::NAN
            } else {
                a.min(b)
            }
        })
    }
}

fn nan() -> f64 {
    f64::NAN
}

fn nan_if_null<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}
