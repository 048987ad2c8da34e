//! Ranking engine: eligibility, per-strategy scoring, bounded top-k.
//!
//! `rank()` works on one (organization, dataset, endpoint) triple:
//! 1. Gather candidates (CV records, or the custom list for CUSTOM).
//! 2. Drop ineligible candidates: missing test record when a test set is
//!    required, missing CVCF record or model condition when the strategy
//!    reads them.
//! 3. Run strategy pre-passes (the color detector, custom positions).
//! 4. Score every survivor through [`RankingEngine::score`]; NaN scores are
//!    excluded, the rest feed a [`BoundedTopK`] in candidate order.
//!
//! Missing data never fails a run. Each exclusion is counted by reason and
//! logged.

use std::collections::{HashMap, HashSet};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use modelsel_core::domain::{
    EvalMethod, Measure, MeasureSet, ModelConditions, ModelId, PerformanceRecord, TripleKey,
};
use modelsel_core::normalization::{NormalizationEngine, NormalizationError};
use modelsel_core::store::{CustomRankings, PerformanceStore, TripleSlice};

use crate::color::{self, ColorParams, ColorPoint, ColorVerdict};
use crate::config::SelectionConfig;
use crate::strategy::RankingStrategy;
use crate::topk::BoundedTopK;

#[derive(Debug, Error)]
pub enum RankError {
    #[error("normalization: {0}")]
    Normalization(#[from] NormalizationError),
}

// ─── Exclusions ──────────────────────────────────────────────────────

/// Why a candidate did not reach the top-k selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exclusion {
    MissingCv,
    MissingCvcf,
    MissingTest,
    MissingCondition,
    UnmatchedLevel,
    MissingSubmissionRank,
    InsufficientNeighbors,
    /// COLOR: z above the selection threshold.
    NotSelected,
    /// COLOR_THRESHOLD: refinement raised MCC.
    PositiveColor,
    NanScore,
}

/// Per-reason exclusion counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionCounts {
    pub missing_cv: usize,
    pub missing_cvcf: usize,
    pub missing_test: usize,
    pub missing_condition: usize,
    pub unmatched_level: usize,
    pub missing_submission_rank: usize,
    pub insufficient_neighbors: usize,
    pub not_selected: usize,
    pub positive_color: usize,
    pub nan_score: usize,
}

impl ExclusionCounts {
    pub fn record(&mut self, reason: Exclusion) {
        let slot = match reason {
            Exclusion::MissingCv => &mut self.missing_cv,
            Exclusion::MissingCvcf => &mut self.missing_cvcf,
            Exclusion::MissingTest => &mut self.missing_test,
            Exclusion::MissingCondition => &mut self.missing_condition,
            Exclusion::UnmatchedLevel => &mut self.unmatched_level,
            Exclusion::MissingSubmissionRank => &mut self.missing_submission_rank,
            Exclusion::InsufficientNeighbors => &mut self.insufficient_neighbors,
            Exclusion::NotSelected => &mut self.not_selected,
            Exclusion::PositiveColor => &mut self.positive_color,
            Exclusion::NanScore => &mut self.nan_score,
        };
        *slot += 1;
    }

    pub fn merge(&mut self, other: &ExclusionCounts) {
        self.missing_cv += other.missing_cv;
        self.missing_cvcf += other.missing_cvcf;
        self.missing_test += other.missing_test;
        self.missing_condition += other.missing_condition;
        self.unmatched_level += other.unmatched_level;
        self.missing_submission_rank += other.missing_submission_rank;
        self.insufficient_neighbors += other.insufficient_neighbors;
        self.not_selected += other.not_selected;
        self.positive_color += other.positive_color;
        self.nan_score += other.nan_score;
    }

    pub fn total(&self) -> usize {
        self.missing_cv
            + self.missing_cvcf
            + self.missing_test
            + self.missing_condition
            + self.unmatched_level
            + self.missing_submission_rank
            + self.insufficient_neighbors
            + self.not_selected
            + self.positive_color
            + self.nan_score
    }
}

// ─── Shortlist ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortlistEntry {
    pub model_id: ModelId,
    pub score: f64,
}

/// Best-first selection for one triple and strategy. Rank 1 is `entries[0]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shortlist {
    pub key: TripleKey,
    pub strategy: RankingStrategy,
    pub entries: Vec<ShortlistEntry>,
}

impl Shortlist {
    pub fn model_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.model_id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The first `depth` entries (all of them if `depth` exceeds the length).
    pub fn top(&self, depth: usize) -> &[ShortlistEntry] {
        &self.entries[..depth.min(self.entries.len())]
    }
}

/// Shortlist plus the bookkeeping behind it.
#[derive(Debug, Clone)]
pub struct RankOutcome {
    pub shortlist: Shortlist,
    /// Candidates considered before eligibility filtering.
    pub candidates: usize,
    pub exclusions: ExclusionCounts,
}

// ─── Context ─────────────────────────────────────────────────────────

/// Read-only state shared by every triple of a run.
#[derive(Debug, Clone, Copy)]
pub struct RankContext<'a> {
    pub store: &'a PerformanceStore,
    pub normalization: &'a NormalizationEngine,
    pub conditions: &'a ModelConditions,
    pub custom_rankings: &'a CustomRankings,
    pub config: &'a SelectionConfig,
}

/// One model under consideration, with whichever records it has.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub model_id: &'a str,
    pub cv: Option<&'a PerformanceRecord>,
    pub cvcf: Option<&'a PerformanceRecord>,
    pub test: Option<&'a PerformanceRecord>,
}

/// Result of scoring one candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scored {
    Score(f64),
    Excluded(Exclusion),
}

/// Strategy state computed over the whole candidate set before scoring.
#[derive(Debug, Default)]
pub enum Prepass<'a> {
    #[default]
    None,
    Color(HashMap<&'a str, ColorVerdict>),
    Custom(HashMap<&'a str, usize>),
}

// ─── Engine ──────────────────────────────────────────────────────────

/// Ranks the triples of one organization.
#[derive(Debug, Clone, Copy)]
pub struct RankingEngine<'a> {
    ctx: RankContext<'a>,
    organization: &'a str,
}

impl<'a> RankingEngine<'a> {
    pub fn new(ctx: RankContext<'a>, organization: &'a str) -> Self {
        Self { ctx, organization }
    }

    /// Shortlist of at most `k` models for (dataset, endpoint).
    pub fn rank(
        &self,
        dataset: &str,
        endpoint: &str,
        strategy: RankingStrategy,
        k: usize,
    ) -> Result<RankOutcome, RankError> {
        let key = TripleKey::new(self.organization, dataset, endpoint);
        let slice = self.ctx.store.slice(&key);
        self.rank_slice(&slice, strategy, k)
    }

    /// Like [`rank`](Self::rank), over an already built slice.
    pub fn rank_slice(
        &self,
        slice: &TripleSlice<'a>,
        strategy: RankingStrategy,
        k: usize,
    ) -> Result<RankOutcome, RankError> {
        let key = &slice.key;
        let gathered = self.gather(slice, strategy);
        let candidates = gathered.len();
        let mut exclusions = ExclusionCounts::default();

        let mut eligible = Vec::with_capacity(gathered.len());
        for c in gathered {
            match self.eligibility(key, &c, strategy) {
                Some(reason) => exclusions.record(reason),
                None => eligible.push(c),
            }
        }

        if strategy == RankingStrategy::MinCvCvcf {
            warn!(
                "{key}: MIN_CV_CVCF scores with the CVCF composite; \
                 the CV/CVCF minimum is computed but not used"
            );
        }

        let prepass = self.prepass(key, &eligible, strategy);
        let mut top = BoundedTopK::new(k);
        for c in &eligible {
            match self.score(key, c, strategy, &prepass)? {
                Scored::Score(s) if s.is_nan() => {
                    debug!("{key}: {} scored NaN, excluded", c.model_id);
                    exclusions.record(Exclusion::NanScore);
                }
                Scored::Score(s) => {
                    top.insert(c.model_id, s);
                }
                Scored::Excluded(reason) => exclusions.record(reason),
            }
        }

        let entries: Vec<ShortlistEntry> = top
            .into_sorted()
            .into_iter()
            .map(|(id, score)| ShortlistEntry {
                model_id: id.to_string(),
                score,
            })
            .collect();
        debug!(
            "{key}: {strategy} shortlisted {} of {candidates} candidates ({} excluded)",
            entries.len(),
            exclusions.total()
        );

        Ok(RankOutcome {
            shortlist: Shortlist {
                key: key.clone(),
                strategy,
                entries,
            },
            candidates,
            exclusions,
        })
    }

    fn gather(&self, slice: &TripleSlice<'a>, strategy: RankingStrategy) -> Vec<Candidate<'a>> {
        if strategy != RankingStrategy::Custom {
            return slice
                .cv_records()
                .iter()
                .copied()
                .map(|r| Candidate {
                    model_id: r.model_id.as_str(),
                    cv: Some(r),
                    cvcf: slice.cvcf(&r.model_id),
                    test: slice.test(&r.model_id),
                })
                .collect();
        }

        let Some(list) = self.ctx.custom_rankings.get(&slice.key.dataset_endpoint()) else {
            warn!("{}: no custom ranking supplied", slice.key);
            return Vec::new();
        };
        let mut seen = HashSet::new();
        list.iter()
            .filter(|id| seen.insert(id.as_str()))
            .map(|id| Candidate {
                model_id: id.as_str(),
                cv: slice.cv(id),
                cvcf: slice.cvcf(id),
                test: slice.test(id),
            })
            .collect()
    }

    fn eligibility(
        &self,
        key: &TripleKey,
        c: &Candidate<'a>,
        strategy: RankingStrategy,
    ) -> Option<Exclusion> {
        let reason = if self.ctx.config.require_test_set && c.test.is_none() {
            Exclusion::MissingTest
        } else if strategy != RankingStrategy::Custom && c.cv.is_none() {
            Exclusion::MissingCv
        } else if strategy.needs_cvcf() && c.cvcf.is_none() {
            Exclusion::MissingCvcf
        } else if strategy == RankingStrategy::Model
            && !self.ctx.conditions.contains_key(c.model_id)
        {
            Exclusion::MissingCondition
        } else {
            return None;
        };
        warn!("{key}: {} excluded ({reason:?})", c.model_id);
        Some(reason)
    }

    fn prepass(
        &self,
        key: &TripleKey,
        eligible: &[Candidate<'a>],
        strategy: RankingStrategy,
    ) -> Prepass<'a> {
        match strategy {
            RankingStrategy::Color => {
                // Index-aligned with `eligible`; a missing record yields an
                // incomplete point.
                let points: Vec<ColorPoint> = eligible
                    .iter()
                    .map(|c| match (c.cv, c.cvcf) {
                        (Some(cv), Some(cvcf)) => ColorPoint::new(&cv.values, &cvcf.values),
                        _ => ColorPoint::new(&MeasureSet::missing(), &MeasureSet::missing()),
                    })
                    .collect();
                let verdicts = color::detect(&points, &self.color_params());
                let map: HashMap<&'a str, ColorVerdict> = eligible
                    .iter()
                    .map(|c| c.model_id)
                    .zip(verdicts)
                    .collect();
                let selected = map.values().filter(|v| v.is_selected()).count();
                debug!("{key}: color detector selected {selected} of {}", map.len());
                Prepass::Color(map)
            }
            RankingStrategy::Custom => Prepass::Custom(
                eligible
                    .iter()
                    .enumerate()
                    .map(|(pos, c)| (c.model_id, pos))
                    .collect(),
            ),
            _ => Prepass::None,
        }
    }

    fn color_params(&self) -> ColorParams {
        let config = self.ctx.config;
        ColorParams {
            z_threshold: config.z_threshold,
            neighbor_distance: config.neighbor_distance,
            min_neighbors: config.min_neighbors,
        }
    }

    /// Score one eligible candidate under `strategy`.
    ///
    /// Eligibility has already guaranteed the records the strategy reads.
    pub fn score(
        &self,
        key: &TripleKey,
        c: &Candidate<'a>,
        strategy: RankingStrategy,
        prepass: &Prepass<'a>,
    ) -> Result<Scored, RankError> {
        let config = self.ctx.config;
        let scored = match (strategy, c.cv, c.cvcf) {
            (RankingStrategy::Custom, _, _) => match prepass {
                Prepass::Custom(positions) => positions
                    .get(c.model_id)
                    .map_or(Scored::Excluded(Exclusion::NanScore), |pos| {
                        Scored::Score(-(*pos as f64))
                    }),
                _ => Scored::Excluded(Exclusion::NanScore),
            },

            (RankingStrategy::SubmissionRank, Some(cv), _) => match cv.submission_rank {
                Some(rank) => Scored::Score(-f64::from(rank)),
                None => {
                    warn!("{key}: {} has no submission rank", c.model_id);
                    Scored::Excluded(Exclusion::MissingSubmissionRank)
                }
            },

            (RankingStrategy::Cv, Some(cv), _) => {
                Scored::Score(self.composite(cv, EvalMethod::Cv)?)
            }

            (RankingStrategy::Cvcf, _, Some(cvcf)) => {
                Scored::Score(self.composite(cvcf, EvalMethod::Cvcf)?)
            }

            (RankingStrategy::MinCvCvcf, Some(cv), Some(cvcf)) => {
                let floor = cv.values.elementwise_min(&cvcf.values);
                debug!(
                    "{key}: {} min(CV, CVCF) mcc={:.4} auc={:.4} (unused)",
                    c.model_id, floor.mcc, floor.auc
                );
                Scored::Score(self.composite(cvcf, EvalMethod::Cvcf)?)
            }

            (RankingStrategy::ColorThreshold, Some(cv), Some(cvcf)) => {
                let color = color::color(&cv.values, &cvcf.values);
                if color > 0.0 {
                    Scored::Excluded(Exclusion::PositiveColor)
                } else if color.is_nan() {
                    Scored::Excluded(Exclusion::NanScore)
                } else {
                    Scored::Score(self.composite(cvcf, EvalMethod::Cvcf)?)
                }
            }

            (RankingStrategy::Color, Some(cv), Some(cvcf)) => {
                let verdict = match prepass {
                    Prepass::Color(verdicts) => verdicts.get(c.model_id).copied(),
                    _ => None,
                };
                match verdict {
                    Some(ColorVerdict::Selected { .. }) => {
                        Scored::Score(config.reward.color_reward(&cv.values, &cvcf.values))
                    }
                    Some(ColorVerdict::NotSelected { .. }) => {
                        Scored::Excluded(Exclusion::NotSelected)
                    }
                    Some(ColorVerdict::InsufficientNeighbors { .. }) => {
                        Scored::Excluded(Exclusion::InsufficientNeighbors)
                    }
                    Some(ColorVerdict::Incomplete) | None => Scored::Excluded(Exclusion::NanScore),
                }
            }

            (RankingStrategy::Model, Some(cv), Some(cvcf)) => {
                let Some(condition) = self.ctx.conditions.get(c.model_id) else {
                    return Ok(Scored::Excluded(Exclusion::MissingCondition));
                };
                match config
                    .model_variant
                    .model()
                    .predict(&cv.values, &cvcf.values, condition)
                {
                    Ok(y) => Scored::Score(y),
                    Err(unmatched) => {
                        warn!("{key}: {}: {unmatched}", c.model_id);
                        Scored::Excluded(Exclusion::UnmatchedLevel)
                    }
                }
            }

            (_, None, _) => Scored::Excluded(Exclusion::MissingCv),
            (_, _, None) => Scored::Excluded(Exclusion::MissingCvcf),
        };
        Ok(scored)
    }

    /// The run's composite measure on one record, optionally population-relative.
    fn composite(&self, record: &PerformanceRecord, method: EvalMethod) -> Result<f64, RankError> {
        let config = self.ctx.config;
        if !config.normalize_composite {
            return Ok(config.composite.extract(&record.values, &record.std_devs));
        }
        let norm = self.ctx.normalization;
        let endpoint = record.endpoint.as_str();
        let mut values = MeasureSet::missing();
        let mut sds = MeasureSet::missing();
        for m in Measure::ALL {
            values.set(m, norm.normalize(endpoint, method, m, record.value(m))?);
            sds.set(m, norm.normalize(endpoint, method, m, record.std_dev(m))?);
        }
        Ok(config.composite.extract(&values, &sds))
    }
}
