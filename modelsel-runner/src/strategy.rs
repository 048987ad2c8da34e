//! Ranking strategies: which eligibility filter and score function apply.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::measures::parse_named;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum RankingStrategy {
    /// Composite of the CV record.
    #[default]
    Cv,
    /// Composite of the CVCF record.
    Cvcf,
    /// Needs both CV and CVCF; scores with the CVCF composite.
    MinCvCvcf,
    /// Neighborhood outlier selection, then reward scoring.
    Color,
    /// Drops candidates whose CVCF refinement raised MCC.
    ColorThreshold,
    /// Pre-fit linear predictor of validation performance.
    Model,
    /// Externally supplied order.
    Custom,
    /// Externally supplied per-record rank.
    SubmissionRank,
}

impl RankingStrategy {
    pub const ALL: [RankingStrategy; 8] = [
        Self::Cv,
        Self::Cvcf,
        Self::MinCvCvcf,
        Self::Color,
        Self::ColorThreshold,
        Self::Model,
        Self::Custom,
        Self::SubmissionRank,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Cv => "CV",
            Self::Cvcf => "CVCF",
            Self::MinCvCvcf => "MIN_CV_CVCF",
            Self::Color => "COLOR",
            Self::ColorThreshold => "COLOR_THRESHOLD",
            Self::Model => "MODEL",
            Self::Custom => "CUSTOM",
            Self::SubmissionRank => "SUBMISSION_RANK",
        }
    }

    /// Whether scoring reads the CVCF record.
    pub fn needs_cvcf(&self) -> bool {
        matches!(
            self,
            Self::Cvcf | Self::MinCvCvcf | Self::Color | Self::ColorThreshold | Self::Model
        )
    }
}

impl fmt::Display for RankingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RankingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_named(&Self::ALL, Self::name, "ranking strategy", s)
    }
}

impl TryFrom<String> for RankingStrategy {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}
