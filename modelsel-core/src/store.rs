//! Performance record store: the in-memory table handed to the engine.
//!
//! Records live in one list per evaluation method. The unfiltered lists are
//! the population used for normalization statistics; `slice()` produces the
//! filtered view for a single (organization, dataset, endpoint) triple.
//!
//! `PerformanceSnapshot` is the JSON boundary with the external loaders:
//! records per method, model conditions and custom rankings in one document.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{
    DatasetEndpoint, EvalMethod, ModelConditions, ModelId, PerformanceRecord, TripleKey,
};

/// Errors from building or loading the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse snapshot: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate {method} record for model '{model_id}' in {key}")]
    Duplicate {
        method: EvalMethod,
        key: TripleKey,
        model_id: ModelId,
    },
    #[error("duplicate custom ranking for {0}")]
    DuplicateCustomRanking(DatasetEndpoint),
}

/// Externally supplied orderings, keyed by (dataset, endpoint).
pub type CustomRankings = HashMap<DatasetEndpoint, Vec<ModelId>>;

/// All performance records, one list per evaluation method.
#[derive(Debug, Clone, Default)]
pub struct PerformanceStore {
    cv: Vec<PerformanceRecord>,
    cvcf: Vec<PerformanceRecord>,
    test: Vec<PerformanceRecord>,
    seen: HashSet<(EvalMethod, TripleKey, ModelId)>,
}

impl PerformanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record measured under `method`.
    ///
    /// A second record for the same (method, triple, model id) is rejected.
    pub fn insert(
        &mut self,
        method: EvalMethod,
        record: PerformanceRecord,
    ) -> Result<(), StoreError> {
        let key = record.triple();
        if !self
            .seen
            .insert((method, key.clone(), record.model_id.clone()))
        {
            return Err(StoreError::Duplicate {
                method,
                key,
                model_id: record.model_id,
            });
        }
        self.list_mut(method).push(record);
        Ok(())
    }

    /// Every record for `method`, unfiltered, in insertion order.
    pub fn records(&self, method: EvalMethod) -> &[PerformanceRecord] {
        match method {
            EvalMethod::Cv => &self.cv,
            EvalMethod::Cvcf => &self.cvcf,
            EvalMethod::Test => &self.test,
        }
    }

    fn list_mut(&mut self, method: EvalMethod) -> &mut Vec<PerformanceRecord> {
        match method {
            EvalMethod::Cv => &mut self.cv,
            EvalMethod::Cvcf => &mut self.cvcf,
            EvalMethod::Test => &mut self.test,
        }
    }

    pub fn len(&self) -> usize {
        self.cv.len() + self.cvcf.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every triple with at least one CV record, sorted.
    ///
    /// A candidate without a CV record is never eligible, so triples with only
    /// CVCF or test records have nothing to rank.
    pub fn triples(&self) -> Vec<TripleKey> {
        self.cv
            .iter()
            .map(PerformanceRecord::triple)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Every endpoint seen under any method, sorted.
    pub fn endpoints(&self) -> Vec<String> {
        EvalMethod::ALL
            .iter()
            .flat_map(|m| self.records(*m).iter().map(|r| r.endpoint.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Filtered view of one triple.
    pub fn slice(&self, key: &TripleKey) -> TripleSlice<'_> {
        let by_id = |method: EvalMethod| -> HashMap<&str, &PerformanceRecord> {
            self.records(method)
                .iter()
                .filter(|r| r.belongs_to(key))
                .map(|r| (r.model_id.as_str(), r))
                .collect()
        };
        let cv: Vec<&PerformanceRecord> = self.cv.iter().filter(|r| r.belongs_to(key)).collect();
        let slice = TripleSlice {
            key: key.clone(),
            cv,
            cvcf: by_id(EvalMethod::Cvcf),
            test: by_id(EvalMethod::Test),
        };
        debug!(
            "{key}: {} CV, {} CVCF, {} test records",
            slice.cv.len(),
            slice.cvcf.len(),
            slice.test.len()
        );
        slice
    }
}

/// Records of one (organization, dataset, endpoint) triple.
///
/// CV records keep store insertion order; that order is the tie-break order
/// for ranking.
#[derive(Debug, Clone)]
pub struct TripleSlice<'a> {
    pub key: TripleKey,
    cv: Vec<&'a PerformanceRecord>,
    cvcf: HashMap<&'a str, &'a PerformanceRecord>,
    test: HashMap<&'a str, &'a PerformanceRecord>,
}

impl<'a> TripleSlice<'a> {
    pub fn cv_records(&self) -> &[&'a PerformanceRecord] {
        &self.cv
    }

    pub fn cvcf(&self, model_id: &str) -> Option<&'a PerformanceRecord> {
        self.cvcf.get(model_id).copied()
    }

    pub fn test(&self, model_id: &str) -> Option<&'a PerformanceRecord> {
        self.test.get(model_id).copied()
    }

    pub fn cv(&self, model_id: &str) -> Option<&'a PerformanceRecord> {
        self.cv.iter().find(|r| r.model_id == model_id).copied()
    }

    pub fn has_test_records(&self) -> bool {
        !self.test.is_empty()
    }
}

// ─── Snapshot ────────────────────────────────────────────────────────

/// One custom ordering for a (dataset, endpoint) pair, best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomRanking {
    pub dataset: String,
    pub endpoint: String,
    pub model_ids: Vec<ModelId>,
}

/// Serialized form of everything the engine consumes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    #[serde(default)]
    pub cv: Vec<PerformanceRecord>,
    #[serde(default)]
    pub cvcf: Vec<PerformanceRecord>,
    #[serde(default)]
    pub test: Vec<PerformanceRecord>,
    #[serde(default)]
    pub conditions: ModelConditions,
    #[serde(default)]
    pub custom_rankings: Vec<CustomRanking>,
}

/// The engine inputs, split out of a snapshot.
#[derive(Debug, Clone, Default)]
pub struct EngineInputs {
    pub store: PerformanceStore,
    pub conditions: ModelConditions,
    pub custom_rankings: CustomRankings,
}

impl PerformanceSnapshot {
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Validate and index the snapshot.
    pub fn into_inputs(self) -> Result<EngineInputs, StoreError> {
        let mut store = PerformanceStore::new();
        for (method, records) in [
            (EvalMethod::Cv, self.cv),
            (EvalMethod::Cvcf, self.cvcf),
            (EvalMethod::Test, self.test),
        ] {
            for record in records {
                store.insert(method, record)?;
            }
        }

        let mut custom_rankings = CustomRankings::new();
        for ranking in self.custom_rankings {
            let key = DatasetEndpoint::new(ranking.dataset, ranking.endpoint);
            if custom_rankings.contains_key(&key) {
                return Err(StoreError::DuplicateCustomRanking(key));
            }
            custom_rankings.insert(key, ranking.model_ids);
        }

        Ok(EngineInputs {
            store,
            conditions: self.conditions,
            custom_rankings,
        })
    }
}
