//! Model conditions: free-text attributes describing how a candidate was built.
//!
//! Raw attributes come from the external loader. Four categorical attributes
//! are derived from the free text by fixed substring rules so that the
//! regression-based ranking can look them up by exact match:
//!
//! | derived                | source                   |
//! | ---------------------- | ------------------------ |
//! | `classifier_family`    | `classifier`             |
//! | `fs_type`              | `feature_selection`      |
//! | `default_c`            | `classifier`             |
//! | `feature_count_bucket` | `declared_feature_count` |
//!
//! `fs_fold` is normalized to `"true"`/`"false"` in place. A derived attribute
//! already present in the raw map is kept as given.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::ids::ModelId;

/// Attribute names.
pub mod attr {
    pub const CLASSIFIER: &str = "classifier";
    pub const FEATURE_SELECTION: &str = "feature_selection";
    pub const FS_FOLD: &str = "fs_fold";
    pub const DECLARED_FEATURE_COUNT: &str = "declared_feature_count";
    pub const FS_SEQUENCE_FILE: &str = "fs_sequence_file";

    pub const CLASSIFIER_FAMILY: &str = "classifier_family";
    pub const FS_TYPE: &str = "fs_type";
    pub const DEFAULT_C: &str = "default_c";
    pub const FEATURE_COUNT_BUCKET: &str = "feature_count_bucket";
}

/// Attribute map for one candidate model.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct ModelCondition {
    attributes: BTreeMap<String, String>,
}

/// Conditions for every known model id.
pub type ModelConditions = HashMap<ModelId, ModelCondition>;

impl ModelCondition {
    /// Build from raw loader attributes, filling in derived attributes.
    pub fn from_raw(mut raw: BTreeMap<String, String>) -> Self {
        let classifier = raw.get(attr::CLASSIFIER).cloned().unwrap_or_default();
        let family = raw
            .get(attr::CLASSIFIER_FAMILY)
            .cloned()
            .unwrap_or_else(|| classifier_family(&classifier).to_string());

        if !raw.contains_key(attr::DEFAULT_C) {
            let default_c = family == "SVM" && uses_default_c(&classifier);
            raw.insert(attr::DEFAULT_C.into(), default_c.to_string());
        }
        raw.entry(attr::CLASSIFIER_FAMILY.into()).or_insert(family);

        if !raw.contains_key(attr::FS_TYPE) {
            let fs = raw
                .get(attr::FEATURE_SELECTION)
                .map(String::as_str)
                .unwrap_or("");
            let fs_type = feature_selection_type(fs).to_string();
            raw.insert(attr::FS_TYPE.into(), fs_type);
        }

        if let Some(flag) = raw.get_mut(attr::FS_FOLD) {
            *flag = normalize_flag(flag).to_string();
        }

        if !raw.contains_key(attr::FEATURE_COUNT_BUCKET) {
            let bucket = raw
                .get(attr::DECLARED_FEATURE_COUNT)
                .map(|s| feature_count_bucket(s))
                .unwrap_or("unknown");
            raw.insert(attr::FEATURE_COUNT_BUCKET.into(), bucket.to_string());
        }

        Self { attributes: raw }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

impl From<BTreeMap<String, String>> for ModelCondition {
    fn from(raw: BTreeMap<String, String>) -> Self {
        Self::from_raw(raw)
    }
}

impl From<ModelCondition> for BTreeMap<String, String> {
    fn from(c: ModelCondition) -> Self {
        c.attributes
    }
}

// ─── Derivation rules ────────────────────────────────────────────────

/// Classifier family from free text. First matching rule wins.
pub fn classifier_family(text: &str) -> &'static str {
    let t = text.to_ascii_lowercase();
    if t.contains("svm") {
        "SVM"
    } else if t.contains("knn") || t.contains("nearest") {
        "KNN"
    } else if t.contains("bayes") {
        "NB"
    } else if t.contains("lda") || t.contains("discriminant") {
        "LDA"
    } else if t.contains("forest") || t.contains("tree") {
        "TREE"
    } else if t.contains("logistic") {
        "LR"
    } else {
        "OTHER"
    }
}

/// Feature-selection type from free text. First matching rule wins.
pub fn feature_selection_type(text: &str) -> &'static str {
    let t = text.trim().to_ascii_lowercase();
    if t.is_empty() || t == "none" {
        "NONE"
    } else if t.contains("t-test") || t.contains("ttest") || t.contains("t_test") {
        "TTEST"
    } else if t.contains("rfe") {
        "RFE"
    } else if t.contains("mrmr") {
        "MRMR"
    } else if t.contains("wilcox") {
        "WILCOXON"
    } else if t.contains("random") {
        "RANDOM"
    } else {
        "OTHER"
    }
}

/// True when the classifier text carries no `c=` parameter or sets it to 1.
pub fn uses_default_c(text: &str) -> bool {
    let t = text.to_ascii_lowercase();
    let Some(pos) = t.find("c=") else {
        return true;
    };
    let digits: String = t[pos + 2..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    matches!(digits.parse::<f64>(), Ok(c) if (c - 1.0).abs() < 1e-12)
}

/// Discretized declared feature count.
pub fn feature_count_bucket(text: &str) -> &'static str {
    match text.trim().parse::<i64>() {
        Ok(n) if (1..=10).contains(&n) => "1-10",
        Ok(n) if (11..=50).contains(&n) => "11-50",
        Ok(n) if (51..=200).contains(&n) => "51-200",
        Ok(n) if n > 200 => ">200",
        _ => "unknown",
    }
}

fn normalize_flag(text: &str) -> &'static str {
    match text.trim().to_ascii_lowercase().as_str() {
        "1" | "yes" | "y" | "true" => "true",
        _ => "false",
    }
}
