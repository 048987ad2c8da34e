//! Tab-separated report streams and the JSON run manifest.
//!
//! Two streams per run:
//! - **ranked models**: one row per shortlist position;
//! - **significance**: one row per shortlist depth.
//!
//! Each stream writes its header once, on creation. A triple's rows go out as
//! one block under the writer's lock, so blocks never interleave.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use modelsel_core::domain::{EvalMethod, Measure};
use modelsel_core::normalization::{NormalizationEngine, NormalizationError};
use modelsel_core::store::TripleSlice;

use crate::pipeline::RunManifest;
use crate::ranking::Shortlist;
use crate::significance::SignificanceReport;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("report CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("report writer lock poisoned")]
    Poisoned,
    #[error("failed to flush report: {0}")]
    Flush(String),
}

// ─── Rows ────────────────────────────────────────────────────────────

pub const RANKED_HEADER: [&str; 16] = [
    "organization",
    "dataset",
    "endpoint",
    "strategy",
    "rank",
    "model_id",
    "score",
    "cv_auc",
    "cv_mcc",
    "norm_cv_auc",
    "norm_cv_mcc",
    "test_auc",
    "test_mcc",
    "is_top1",
    "is_top5",
    "excel_column_label",
];

/// One shortlist position. Field order matches [`RANKED_HEADER`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedRow {
    pub organization: String,
    pub dataset: String,
    pub endpoint: String,
    pub strategy: String,
    pub rank: usize,
    pub model_id: String,
    pub score: f64,
    pub cv_auc: f64,
    pub cv_mcc: f64,
    pub norm_cv_auc: f64,
    pub norm_cv_mcc: f64,
    pub test_auc: Option<f64>,
    pub test_mcc: Option<f64>,
    pub is_top1: bool,
    pub is_top5: bool,
    pub excel_column_label: String,
}

impl RankedRow {
    /// Rows for a whole shortlist, rank 1 first.
    ///
    /// CUSTOM shortlists may hold models without a CV record; their CV
    /// columns are NaN and their label is empty.
    pub fn from_shortlist(
        shortlist: &Shortlist,
        slice: &TripleSlice<'_>,
        normalization: &NormalizationEngine,
    ) -> Result<Vec<RankedRow>, NormalizationError> {
        let key = &shortlist.key;
        shortlist
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let rank = i + 1;
                let cv = slice.cv(&entry.model_id);
                let cv_auc = cv.map_or(f64::NAN, |r| r.value(Measure::Auc));
                let cv_mcc = cv.map_or(f64::NAN, |r| r.value(Measure::Mcc));
                let test = slice.test(&entry.model_id);
                let norm = |m: Measure, v: f64| {
                    normalization.normalize(&key.endpoint, EvalMethod::Cv, m, v)
                };
                Ok(RankedRow {
                    organization: key.organization.clone(),
                    dataset: key.dataset.clone(),
                    endpoint: key.endpoint.clone(),
                    strategy: shortlist.strategy.to_string(),
                    rank,
                    model_id: entry.model_id.clone(),
                    score: entry.score,
                    cv_auc,
                    cv_mcc,
                    norm_cv_auc: norm(Measure::Auc, cv_auc)?,
                    norm_cv_mcc: norm(Measure::Mcc, cv_mcc)?,
                    test_auc: test.map(|r| r.value(Measure::Auc)),
                    test_mcc: test.map(|r| r.value(Measure::Mcc)),
                    is_top1: rank == 1,
                    is_top5: rank <= 5,
                    excel_column_label: cv
                        .map(|r| r.excel_column_label.clone())
                        .unwrap_or_default(),
                })
            })
            .collect()
    }
}

pub const SIGNIFICANCE_HEADER: [&str; 13] = [
    "organization",
    "dataset",
    "endpoint",
    "strategy",
    "reward",
    "depth",
    "actual",
    "random",
    "ratio",
    "p_value",
    "n_resamples",
    "seed",
    "shortlist_len",
];

/// One shortlist depth. Field order matches [`SIGNIFICANCE_HEADER`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignificanceRow {
    pub organization: String,
    pub dataset: String,
    pub endpoint: String,
    pub strategy: String,
    pub reward: String,
    pub depth: usize,
    pub actual: f64,
    pub random: f64,
    pub ratio: f64,
    pub p_value: f64,
    pub n_resamples: usize,
    pub seed: u64,
    pub shortlist_len: usize,
}

impl SignificanceRow {
    pub fn from_report(report: &SignificanceReport, shortlist_len: usize) -> Vec<SignificanceRow> {
        report
            .depths
            .iter()
            .map(|d| SignificanceRow {
                organization: report.key.organization.clone(),
                dataset: report.key.dataset.clone(),
                endpoint: report.key.endpoint.clone(),
                strategy: report.strategy.to_string(),
                reward: report.reward.to_string(),
                depth: d.depth,
                actual: d.actual,
                random: d.random,
                ratio: d.ratio,
                p_value: d.p_value,
                n_resamples: report.n_resamples,
                seed: report.seed,
                shortlist_len,
            })
            .collect()
    }
}

// ─── Writer ──────────────────────────────────────────────────────────

fn tsv_writer<W: Write>(writer: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(writer)
}

/// One report stream, shareable across threads.
pub struct ReportWriter<W: Write> {
    inner: Mutex<csv::Writer<W>>,
}

impl ReportWriter<File> {
    /// Create (truncate) `path` and write `header`.
    pub fn create(path: &Path, header: &[&str]) -> Result<Self, ReportError> {
        let file = File::create(path).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(file, header)
    }
}

impl<W: Write> ReportWriter<W> {
    pub fn new(writer: W, header: &[&str]) -> Result<Self, ReportError> {
        let mut csv = tsv_writer(writer);
        csv.write_record(header)?;
        csv.flush().map_err(|e| ReportError::Flush(e.to_string()))?;
        Ok(Self {
            inner: Mutex::new(csv),
        })
    }

    /// Write `rows` contiguously and flush.
    pub fn write_block<R: Serialize>(&self, rows: &[R]) -> Result<(), ReportError> {
        let mut csv = self.inner.lock().map_err(|_| ReportError::Poisoned)?;
        for row in rows {
            csv.serialize(row)?;
        }
        csv.flush().map_err(|e| ReportError::Flush(e.to_string()))?;
        Ok(())
    }

    pub fn into_inner(self) -> Result<W, ReportError> {
        let csv = self.inner.into_inner().map_err(|_| ReportError::Poisoned)?;
        csv.into_inner()
            .map_err(|e| ReportError::Flush(e.error().to_string()))
    }
}

// ─── Readers ─────────────────────────────────────────────────────────

fn read_rows<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("failed to open report {}", path.display()))?;
    let mut rows = Vec::new();
    for (i, row) in rdr.deserialize().enumerate() {
        let row: T =
            row.with_context(|| format!("{}: malformed row {}", path.display(), i + 1))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Read a ranked-model report back.
pub fn read_ranked_report(path: &Path) -> Result<Vec<RankedRow>> {
    read_rows(path)
}

/// Read a significance report back.
pub fn read_significance_report(path: &Path) -> Result<Vec<SignificanceRow>> {
    read_rows(path)
}

// ─── Manifest ────────────────────────────────────────────────────────

pub const RANKED_FILE: &str = "ranked_models.tsv";
pub const SIGNIFICANCE_FILE: &str = "significance.tsv";
pub const MANIFEST_FILE: &str = "manifest.json";

pub fn write_manifest(manifest: &RunManifest, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(MANIFEST_FILE);
    let json =
        serde_json::to_string_pretty(manifest).context("failed to serialize run manifest")?;
    std::fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

pub fn read_manifest(dir: &Path) -> Result<RunManifest> {
    let path = dir.join(MANIFEST_FILE);
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("failed to parse {}", path.display()))
}
