//! Pre-fit linear predictors of validation performance (MODEL strategy).
//!
//! Each variant is an immutable table: an intercept, slopes for CV AUC and the
//! CVCF − CV AUC delta, and categorical terms whose levels map to learned
//! offsets. Levels are matched exactly against the candidate's
//! [`ModelCondition`]. An unmatched level is an error, never a default offset.

use std::fmt;
use std::str::FromStr;

use modelsel_core::domain::{attr, MeasureSet, ModelCondition};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::measures::parse_named;

/// A categorical value absent from the variant's table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no {variant} coefficient for {attribute} = '{value}'")]
pub struct UnmatchedLevel {
    pub variant: &'static str,
    pub attribute: &'static str,
    pub value: String,
}

/// One categorical term: attribute name and its level offsets.
#[derive(Debug)]
pub struct CategoricalTerm {
    pub attribute: &'static str,
    pub levels: &'static [(&'static str, f64)],
}

impl CategoricalTerm {
    fn offset(&self, level: &str) -> Option<f64> {
        self.levels
            .iter()
            .find(|(name, _)| *name == level)
            .map(|(_, coef)| *coef)
    }
}

/// Coefficient table of one variant.
#[derive(Debug)]
pub struct LinearModel {
    pub name: &'static str,
    pub intercept: f64,
    pub cv_auc: f64,
    pub auc_delta: f64,
    pub terms: &'static [CategoricalTerm],
}

impl LinearModel {
    /// Predicted validation performance.
    ///
    /// A missing attribute is looked up as the empty string, so it only
    /// matches where the table lists an empty level explicitly.
    pub fn predict(
        &self,
        cv: &MeasureSet,
        cvcf: &MeasureSet,
        condition: &ModelCondition,
    ) -> Result<f64, UnmatchedLevel> {
        let mut y = self.intercept + self.cv_auc * cv.auc + self.auc_delta * (cvcf.auc - cv.auc);
        for term in self.terms {
            let level = condition.get(term.attribute).unwrap_or("");
            let offset = term.offset(level).ok_or_else(|| UnmatchedLevel {
                variant: self.name,
                attribute: term.attribute,
                value: level.to_string(),
            })?;
            y += offset;
        }
        Ok(y)
    }
}

// ─── Tables ──────────────────────────────────────────────────────────

const CLASSIFIER_FAMILY: CategoricalTerm = CategoricalTerm {
    attribute: attr::CLASSIFIER_FAMILY,
    levels: &[
        ("SVM", 0.0),
        ("KNN", -0.021),
        ("NB", -0.034),
        ("LDA", -0.012),
        ("TREE", -0.027),
        ("LR", -0.008),
        ("OTHER", -0.041),
    ],
};

const FS_FOLD: CategoricalTerm = CategoricalTerm {
    attribute: attr::FS_FOLD,
    levels: &[("false", 0.0), ("true", 0.016)],
};

const FS_TYPE: CategoricalTerm = CategoricalTerm {
    attribute: attr::FS_TYPE,
    levels: &[
        ("NONE", 0.0),
        ("TTEST", 0.011),
        ("RFE", 0.007),
        ("MRMR", 0.009),
        ("WILCOXON", 0.010),
        ("RANDOM", -0.019),
        ("OTHER", -0.004),
    ],
};

const DEFAULT_C: CategoricalTerm = CategoricalTerm {
    attribute: attr::DEFAULT_C,
    levels: &[("false", 0.0), ("true", 0.013)],
};

const FEATURE_COUNT_BUCKET: CategoricalTerm = CategoricalTerm {
    attribute: attr::FEATURE_COUNT_BUCKET,
    levels: &[
        ("1-10", -0.015),
        ("11-50", 0.0),
        ("51-200", 0.006),
        (">200", -0.003),
    ],
};

const FS_SEQUENCE_FILE: CategoricalTerm = CategoricalTerm {
    attribute: attr::FS_SEQUENCE_FILE,
    levels: &[
        ("", 0.0),
        ("ttest_ranked.txt", 0.008),
        ("rfe_ranked.txt", 0.005),
        ("random_order.txt", -0.022),
    ],
};

static FULL: LinearModel = LinearModel {
    name: "FULL",
    intercept: 0.112,
    cv_auc: 0.781,
    auc_delta: -0.364,
    terms: &[CLASSIFIER_FAMILY, FS_FOLD, FS_TYPE, DEFAULT_C],
};

static REDUCED: LinearModel = LinearModel {
    name: "REDUCED",
    intercept: 0.127,
    cv_auc: 0.764,
    auc_delta: -0.341,
    terms: &[CLASSIFIER_FAMILY, FS_TYPE],
};

static MINIMAL: LinearModel = LinearModel {
    name: "MINIMAL",
    intercept: 0.140,
    cv_auc: 0.752,
    auc_delta: -0.318,
    terms: &[FEATURE_COUNT_BUCKET, FS_SEQUENCE_FILE],
};

// ─── Variant selector ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum ModelVariant {
    #[default]
    Full,
    Reduced,
    Minimal,
}

impl ModelVariant {
    pub const ALL: [ModelVariant; 3] = [Self::Full, Self::Reduced, Self::Minimal];

    pub fn name(&self) -> &'static str {
        self.model().name
    }

    pub fn model(&self) -> &'static LinearModel {
        match self {
            Self::Full => &FULL,
            Self::Reduced => &REDUCED,
            Self::Minimal => &MINIMAL,
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_named(&Self::ALL, Self::name, "model variant", s)
    }
}

impl TryFrom<String> for ModelVariant {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn auc(v: f64) -> MeasureSet {
        let mut s = MeasureSet::missing();
        s.auc = v;
        s
    }

    fn condition(pairs: &[(&str, &str)]) -> ModelCondition {
        ModelCondition::from_raw(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    #[test]
    fn full_prediction_sums_terms() {
        let cond = condition(&[
            ("classifier", "linear svm"),
            ("feature_selection", "t-test"),
            ("fs_fold", "yes"),
        ]);
        let y = ModelVariant::Full
            .model()
            .predict(&auc(0.8), &auc(0.85), &cond)
            .unwrap();
        // SVM 0.0, fs_fold true 0.016, TTEST 0.011, default C true 0.013
        let expected = 0.112 + 0.781 * 0.8 - 0.364 * 0.05 + 0.016 + 0.011 + 0.013;
        assert!((y - expected).abs() < 1e-10);
    }

    #[test]
    fn missing_attribute_is_unmatched() {
        // fs_fold absent from the condition
        let cond = condition(&[("classifier", "svm")]);
        let err = ModelVariant::Full
            .model()
            .predict(&auc(0.8), &auc(0.8), &cond)
            .unwrap_err();
        assert_eq!(err.attribute, attr::FS_FOLD);
        assert_eq!(err.value, "");
    }

    #[test]
    fn reduced_ignores_fold_flag() {
        let cond = condition(&[("classifier", "knn")]);
        let y = ModelVariant::Reduced
            .model()
            .predict(&auc(0.7), &auc(0.7), &cond)
            .unwrap();
        let expected = 0.127 + 0.764 * 0.7 - 0.021;
        assert!((y - expected).abs() < 1e-10);
    }

    #[test]
    fn minimal_matches_sequence_file_exactly() {
        let cond = condition(&[
            ("declared_feature_count", "25"),
            ("fs_sequence_file", "ttest_ranked.txt"),
        ]);
        assert!(ModelVariant::Minimal
            .model()
            .predict(&auc(0.7), &auc(0.7), &cond)
            .is_ok());

        let odd = condition(&[
            ("declared_feature_count", "25"),
            ("fs_sequence_file", "TTEST_RANKED.TXT"),
        ]);
        let err = ModelVariant::Minimal
            .model()
            .predict(&auc(0.7), &auc(0.7), &odd)
            .unwrap_err();
        assert!(err.to_string().contains("'TTEST_RANKED.TXT'"));
    }

    #[test]
    fn unknown_feature_count_is_unmatched() {
        let cond = condition(&[("fs_sequence_file", "")]);
        let err = ModelVariant::Minimal
            .model()
            .predict(&auc(0.7), &auc(0.7), &cond)
            .unwrap_err();
        assert_eq!(err.value, "unknown");
    }

    #[test]
    fn nan_auc_gives_nan_prediction() {
        let cond = condition(&[("classifier", "knn")]);
        let y = ModelVariant::Reduced
            .model()
            .predict(&auc(f64::NAN), &auc(0.7), &cond)
            .unwrap();
        assert!(y.is_nan());
    }

    #[test]
    fn variant_names() {
        assert_eq!("minimal".parse::<ModelVariant>().unwrap(), ModelVariant::Minimal);
        assert!("huge".parse::<ModelVariant>().is_err());
        assert_eq!(ModelVariant::default().to_string(), "FULL");
    }
}
