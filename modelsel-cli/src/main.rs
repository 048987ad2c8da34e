//! modelsel CLI: rank candidate models and inspect population statistics.
//!
//! Commands:
//! - `rank`: run the selection pipeline over a performance snapshot and write
//!   the ranked-model report, the significance report and a manifest
//! - `inspect`: print per-endpoint population statistics and normalization
//!   factors
//! - `strategies`: list the accepted strategy, measure and variant names

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use modelsel_core::domain::{EvalMethod, Measure};
use modelsel_core::normalization::{NormalizationEngine, NormalizationMode};
use modelsel_core::store::{EngineInputs, PerformanceSnapshot};
use modelsel_runner::{
    run_to_dir, CompositeMeasure, ModelVariant, RankingStrategy, RewardMeasure, SelectionConfig,
};

#[derive(Parser)]
#[command(
    name = "modelsel",
    about = "Rank candidate models and validate the selection on held-out data"
)]
struct Cli {
    /// Debug-level logging (RUST_LOG overrides).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank every (organization, dataset, endpoint) triple of a snapshot.
    Rank {
        /// Performance snapshot (JSON).
        #[arg(long)]
        input: PathBuf,

        /// Selection config (TOML). Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Ranking strategy, e.g. CV, COLOR, SUBMISSION_RANK.
        #[arg(long)]
        strategy: Option<String>,

        /// Shortlist size.
        #[arg(long)]
        top_k: Option<usize>,

        /// Master seed for resampling.
        #[arg(long)]
        seed: Option<u64>,

        /// Worker threads.
        #[arg(long)]
        threads: Option<usize>,

        /// Extra overrides as field=value (repeatable).
        #[arg(long = "set", value_name = "FIELD=VALUE")]
        overrides: Vec<String>,

        /// Output directory for reports and manifest.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Print population statistics per endpoint, method and measure.
    Inspect {
        /// Performance snapshot (JSON).
        #[arg(long)]
        input: PathBuf,

        /// Normalization factor to show: mean or max.
        #[arg(long, default_value = "mean")]
        mode: NormalizationMode,
    },
    /// List accepted strategy, measure and model variant names.
    Strategies,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match cli.command {
        Commands::Rank {
            input,
            config,
            strategy,
            top_k,
            seed,
            threads,
            overrides,
            output_dir,
        } => {
            let mut cfg = match config {
                Some(path) => SelectionConfig::from_file(&path)?,
                None => SelectionConfig::default(),
            };
            let mut pairs: Vec<(String, String)> = Vec::new();
            if let Some(s) = strategy {
                pairs.push(("strategy".into(), s));
            }
            if let Some(k) = top_k {
                pairs.push(("top_k".into(), k.to_string()));
            }
            if let Some(s) = seed {
                pairs.push(("master_seed".into(), s.to_string()));
            }
            if let Some(t) = threads {
                pairs.push(("threads".into(), t.to_string()));
            }
            for raw in &overrides {
                pairs.push(parse_override(raw)?);
            }
            for (field, value) in &pairs {
                cfg.set(field, value)?;
            }
            cfg.validate()?;
            run_rank(&input, &cfg, &output_dir)
        }
        Commands::Inspect { input, mode } => run_inspect(&input, mode),
        Commands::Strategies => {
            print_names();
            Ok(())
        }
    }
}

fn parse_override(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((field, value)) if !field.trim().is_empty() => {
            Ok((field.trim().to_string(), value.trim().to_string()))
        }
        _ => bail!("override '{raw}' is not of the form field=value"),
    }
}

fn load_inputs(path: &Path) -> Result<EngineInputs> {
    let snapshot = PerformanceSnapshot::from_file(path)?;
    let inputs = snapshot
        .into_inputs()
        .with_context(|| format!("invalid snapshot {}", path.display()))?;
    info!(
        "loaded {} records ({} conditions, {} custom rankings) from {}",
        inputs.store.len(),
        inputs.conditions.len(),
        inputs.custom_rankings.len(),
        path.display()
    );
    Ok(inputs)
}

fn run_rank(input: &Path, config: &SelectionConfig, output_dir: &Path) -> Result<()> {
    let inputs = load_inputs(input)?;
    let manifest = run_to_dir(&inputs, config, output_dir)?;

    println!("Strategy:  {}", config.strategy);
    println!("Reward:    {}", config.reward);
    println!("Top k:     {}", config.top_k);
    println!("Seed:      {}", manifest.master_seed);
    println!("Triples:   {}", manifest.triples_processed);
    println!(
        "Shortlist: {} models",
        manifest.shortlist_sizes.values().sum::<usize>()
    );
    let ex = &manifest.exclusions;
    println!(
        "Excluded:  {} (missing CV {}, missing CVCF {}, missing test {}, missing condition {}, \
         unmatched level {}, missing rank {}, few neighbors {}, not selected {}, \
         positive color {}, NaN score {})",
        ex.total(),
        ex.missing_cv,
        ex.missing_cvcf,
        ex.missing_test,
        ex.missing_condition,
        ex.unmatched_level,
        ex.missing_submission_rank,
        ex.insufficient_neighbors,
        ex.not_selected,
        ex.positive_color,
        ex.nan_score
    );
    println!("Reports written to: {}", output_dir.display());
    Ok(())
}

fn run_inspect(input: &Path, mode: NormalizationMode) -> Result<()> {
    let inputs = load_inputs(input)?;
    let engine = NormalizationEngine::from_store(&inputs.store, mode);

    println!(
        "{:<20} {:<6} {:<12} {:>7} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "endpoint", "method", "measure", "count", "mean", "sd", "min", "max", "factor"
    );
    for endpoint in engine.endpoints() {
        for method in EvalMethod::ALL {
            for measure in Measure::ALL {
                // Methods without records for this endpoint have no accumulator.
                let Ok(s) = engine.summary(endpoint, method, measure) else {
                    continue;
                };
                let factor = engine.factor(endpoint, method, measure)?;
                println!(
                    "{:<20} {:<6} {:<12} {:>7} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4}",
                    endpoint,
                    method,
                    measure,
                    s.count,
                    s.mean,
                    s.std_dev,
                    s.min,
                    s.max,
                    factor
                );
            }
        }
    }
    Ok(())
}

fn print_names() {
    let join = |names: Vec<&str>| names.join(", ");
    println!(
        "strategies:      {}",
        join(RankingStrategy::ALL.iter().map(|s| s.name()).collect())
    );
    println!(
        "rewards:         {}",
        join(RewardMeasure::ALL.iter().map(|r| r.name()).collect())
    );
    println!(
        "composites:      {}",
        join(CompositeMeasure::ALL.iter().map(|c| c.name()).collect())
    );
    println!(
        "model variants:  {}",
        join(ModelVariant::ALL.iter().map(|v| v.name()).collect())
    );
}
