//! End-to-end selection run.
//!
//! Builds and finalizes the normalization engine once, then processes every
//! (organization, dataset, endpoint) triple independently: rank and estimate
//! significance. Triples run on rayon, optionally inside a dedicated pool when
//! `threads` is set. Report blocks are written afterwards in sorted triple
//! order, so the reports do not depend on scheduling.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use modelsel_core::domain::TripleKey;
use modelsel_core::normalization::{NormalizationEngine, NormalizationError};
use modelsel_core::rng::SeedHierarchy;
use modelsel_core::store::EngineInputs;

use crate::config::{ConfigError, SelectionConfig};
use crate::ranking::{ExclusionCounts, RankContext, RankError, RankingEngine};
use crate::report::{
    self, RankedRow, ReportError, ReportWriter, SignificanceRow, RANKED_FILE, RANKED_HEADER,
    SIGNIFICANCE_FILE, SIGNIFICANCE_HEADER,
};
use crate::significance::SignificanceEstimator;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("ranking: {0}")]
    Rank(#[from] RankError),
    #[error("normalization: {0}")]
    Normalization(#[from] NormalizationError),
    #[error("report: {0}")]
    Report(#[from] ReportError),
    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Rows computed for one triple, written once every triple is done.
struct TripleOutput {
    summary: TripleSummary,
    ranked_rows: Vec<RankedRow>,
    sig_rows: Vec<SignificanceRow>,
}

/// Outcome of one triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripleSummary {
    pub key: TripleKey,
    pub candidates: usize,
    pub shortlisted: usize,
    pub significance_depths: usize,
    pub exclusions: ExclusionCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Sorted by triple key.
    pub triples: Vec<TripleSummary>,
    pub exclusions: ExclusionCounts,
}

impl RunSummary {
    fn from_triples(triples: Vec<TripleSummary>) -> Self {
        let mut exclusions = ExclusionCounts::default();
        for t in &triples {
            exclusions.merge(&t.exclusions);
        }
        Self {
            triples,
            exclusions,
        }
    }

    pub fn shortlisted(&self) -> usize {
        self.triples.iter().map(|t| t.shortlisted).sum()
    }
}

/// Persisted description of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub created_at: DateTime<Utc>,
    pub config: SelectionConfig,
    pub master_seed: u64,
    pub triples_processed: usize,
    /// Shortlist length per triple, keyed by `org:dataset/endpoint`.
    pub shortlist_sizes: BTreeMap<String, usize>,
    pub exclusions: ExclusionCounts,
}

impl RunManifest {
    pub fn new(config: &SelectionConfig, summary: &RunSummary) -> Self {
        Self {
            created_at: Utc::now(),
            config: config.clone(),
            master_seed: config.master_seed,
            triples_processed: summary.triples.len(),
            shortlist_sizes: summary
                .triples
                .iter()
                .map(|t| (t.key.to_string(), t.shortlisted))
                .collect(),
            exclusions: summary.exclusions,
        }
    }
}

/// Rank every triple of `inputs` and stream the results into the writers.
pub fn run_selection<R, S>(
    inputs: &EngineInputs,
    config: &SelectionConfig,
    ranked: &ReportWriter<R>,
    significance: &ReportWriter<S>,
) -> Result<RunSummary, PipelineError>
where
    R: Write + Send,
    S: Write + Send,
{
    config.validate()?;

    let normalization = NormalizationEngine::from_store(&inputs.store, config.normalization_mode);
    let ctx = RankContext {
        store: &inputs.store,
        normalization: &normalization,
        conditions: &inputs.conditions,
        custom_rankings: &inputs.custom_rankings,
        config,
    };
    let seeds = SeedHierarchy::new(config.master_seed);
    let triples = inputs.store.triples();
    info!(
        "ranking {} triples with {} (k = {}, reward {})",
        triples.len(),
        config.strategy,
        config.top_k,
        config.reward
    );

    let process = |key: &TripleKey| process_triple(ctx, seeds, key);
    let results: Vec<Result<TripleOutput, PipelineError>> = match config.threads {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new().num_threads(n).build()?;
            pool.install(|| triples.par_iter().map(process).collect())
        }
        None => triples.par_iter().map(process).collect(),
    };
    // `collect` keeps the sorted order of `triples`.
    let outputs = results.into_iter().collect::<Result<Vec<_>, _>>()?;
    let mut summaries = Vec::with_capacity(outputs.len());
    for out in outputs {
        ranked.write_block(&out.ranked_rows)?;
        significance.write_block(&out.sig_rows)?;
        summaries.push(out.summary);
    }

    let summary = RunSummary::from_triples(summaries);
    info!(
        "shortlisted {} models over {} triples ({} candidates excluded)",
        summary.shortlisted(),
        summary.triples.len(),
        summary.exclusions.total()
    );
    Ok(summary)
}

fn process_triple(
    ctx: RankContext<'_>,
    seeds: SeedHierarchy,
    key: &TripleKey,
) -> Result<TripleOutput, PipelineError> {
    let config = ctx.config;
    let slice = ctx.store.slice(key);
    let engine = RankingEngine::new(ctx, &key.organization);
    let outcome = engine.rank_slice(&slice, config.strategy, config.top_k)?;

    let estimator = SignificanceEstimator::new(
        ctx.store,
        ctx.normalization,
        config.reward,
        config.n_resamples,
        seeds,
    );
    let sig = estimator.estimate(&outcome.shortlist, &slice, config.top_k)?;

    let ranked_rows = RankedRow::from_shortlist(&outcome.shortlist, &slice, ctx.normalization)?;
    let sig_rows = sig
        .as_ref()
        .map(|r| SignificanceRow::from_report(r, outcome.shortlist.len()))
        .unwrap_or_default();

    debug!(
        "{key}: {} ranked rows, {} significance rows",
        ranked_rows.len(),
        sig_rows.len()
    );
    Ok(TripleOutput {
        summary: TripleSummary {
            key: key.clone(),
            candidates: outcome.candidates,
            shortlisted: outcome.shortlist.len(),
            significance_depths: sig_rows.len(),
            exclusions: outcome.exclusions,
        },
        ranked_rows,
        sig_rows,
    })
}

/// Run and write both reports plus the manifest into `dir`.
pub fn run_to_dir(
    inputs: &EngineInputs,
    config: &SelectionConfig,
    dir: &Path,
) -> anyhow::Result<RunManifest> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output dir {}", dir.display()))?;
    let ranked = ReportWriter::create(&dir.join(RANKED_FILE), &RANKED_HEADER)?;
    let significance = ReportWriter::create(&dir.join(SIGNIFICANCE_FILE), &SIGNIFICANCE_HEADER)?;

    let summary = run_selection(inputs, config, &ranked, &significance)?;
    ranked.into_inner()?;
    significance.into_inner()?;

    let manifest = RunManifest::new(config, &summary);
    let path = report::write_manifest(&manifest, dir)?;
    info!("wrote {}", path.display());
    Ok(manifest)
}
