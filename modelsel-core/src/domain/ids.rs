use serde::{Deserialize, Serialize};
use std::fmt;

/// Model identifier, unique within one (organization, dataset, endpoint).
pub type ModelId = String;

/// A (dataset, endpoint) pair: the unit custom rankings are keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetEndpoint {
    pub dataset: String,
    pub endpoint: String,
}

impl DatasetEndpoint {
    pub fn new(dataset: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            endpoint: endpoint.into(),
        }
    }
}

impl fmt::Display for DatasetEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dataset, self.endpoint)
    }
}

/// An (organization, dataset, endpoint) triple: the unit of independent work.
///
/// Ordering is lexicographic on (organization, dataset, endpoint) so triple
/// enumeration is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TripleKey {
    pub organization: String,
    pub dataset: String,
    pub endpoint: String,
}

impl TripleKey {
    pub fn new(
        organization: impl Into<String>,
        dataset: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            organization: organization.into(),
            dataset: dataset.into(),
            endpoint: endpoint.into(),
        }
    }

    pub fn dataset_endpoint(&self) -> DatasetEndpoint {
        DatasetEndpoint::new(self.dataset.clone(), self.endpoint.clone())
    }

    /// Stable byte form used for seed derivation.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            self.organization.len() + self.dataset.len() + self.endpoint.len() + 2,
        );
        out.extend_from_slice(self.organization.as_bytes());
        out.push(0x1f);
        out.extend_from_slice(self.dataset.as_bytes());
        out.push(0x1f);
        out.extend_from_slice(self.endpoint.as_bytes());
        out
    }
}

impl fmt::Display for TripleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.organization, self.dataset, self.endpoint)
    }
}
