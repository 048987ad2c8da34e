use modelsel_core::store::{EngineInputs, PerformanceSnapshot};
use modelsel_runner::measures::{CompositeMeasure, RewardMeasure};
use modelsel_runner::report::{self, RANKED_FILE, SIGNIFICANCE_FILE};
use modelsel_runner::{read_ranked_report, read_significance_report, run_to_dir};
use modelsel_runner::{RankingStrategy, SelectionConfig};

const SNAPSHOT: &str = r#"{
    "cv": [
        {"model_id":"A","organization":"lab","dataset":"liver","endpoint":"tox",
         "values":{"mcc":0.50,"auc":0.80},"submission_rank":2,"excel_column_label":"B4"},
        {"model_id":"B","organization":"lab","dataset":"liver","endpoint":"tox",
         "values":{"mcc":0.40,"auc":0.85},"submission_rank":1},
        {"model_id":"C","organization":"lab","dataset":"liver","endpoint":"tox",
         "values":{"mcc":0.20,"auc":0.60},"submission_rank":3},
        {"model_id":"D","organization":"lab","dataset":"kidney","endpoint":"tox",
         "values":{"mcc":0.30,"auc":0.70}}
    ],
    "cvcf": [
        {"model_id":"A","organization":"lab","dataset":"liver","endpoint":"tox",
         "values":{"mcc":0.45,"auc":0.79}},
        {"model_id":"B","organization":"lab","dataset":"liver","endpoint":"tox",
         "values":{"mcc":0.55,"auc":0.88}}
    ],
    "test": [
        {"model_id":"A","organization":"lab","dataset":"liver","endpoint":"tox",
         "values":{"mcc":0.40,"auc":0.90}},
        {"model_id":"B","organization":"lab","dataset":"liver","endpoint":"tox",
         "values":{"mcc":0.10,"auc":0.30}},
        {"model_id":"D","organization":"lab","dataset":"kidney","endpoint":"tox",
         "values":{"mcc":0.25,"auc":0.60}}
    ],
    "custom_rankings": [
        {"dataset":"liver","endpoint":"tox","model_ids":["C","A","C","B"]}
    ]
}"#;

fn inputs() -> EngineInputs {
    PerformanceSnapshot::from_json(SNAPSHOT)
        .unwrap()
        .into_inputs()
        .unwrap()
}

fn ids_for(rows: &[modelsel_runner::RankedRow], dataset: &str) -> Vec<String> {
    rows.iter()
        .filter(|r| r.dataset == dataset)
        .map(|r| r.model_id.clone())
        .collect()
}

#[test]
fn cv_run_writes_reports_and_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let config = SelectionConfig {
        composite: CompositeMeasure::Mcc,
        ..SelectionConfig::default()
    };
    let manifest = run_to_dir(&inputs(), &config, dir.path()).unwrap();

    assert_eq!(manifest.triples_processed, 2);
    assert_eq!(manifest.shortlist_sizes["lab:liver/tox"], 3);
    assert_eq!(manifest.shortlist_sizes["lab:kidney/tox"], 1);

    let rows = read_ranked_report(&dir.path().join(RANKED_FILE)).unwrap();
    assert_eq!(ids_for(&rows, "liver"), vec!["A", "B", "C"]);
    let a = rows.iter().find(|r| r.model_id == "A").unwrap();
    assert_eq!(a.rank, 1);
    assert!(a.is_top1);
    assert_eq!(a.excel_column_label, "B4");
    assert_eq!(a.test_auc, Some(0.9));
    let c = rows.iter().find(|r| r.model_id == "C").unwrap();
    assert_eq!(c.test_auc, None);

    let back = report::read_manifest(dir.path()).unwrap();
    assert_eq!(back.config, config);
    assert_eq!(back.triples_processed, 2);
}

#[test]
fn ranked_report_round_trips_model_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = SelectionConfig {
        strategy: RankingStrategy::SubmissionRank,
        top_k: 2,
        ..SelectionConfig::default()
    };
    run_to_dir(&inputs(), &config, dir.path()).unwrap();
    let rows = read_ranked_report(&dir.path().join(RANKED_FILE)).unwrap();
    assert_eq!(ids_for(&rows, "liver"), vec!["B", "A"]);
    assert!(ids_for(&rows, "kidney").is_empty());
    assert!(rows.iter().all(|r| r.strategy == "SUBMISSION_RANK"));
}

#[test]
fn significance_reports_ratio_against_endpoint_population() {
    let dir = tempfile::tempdir().unwrap();
    let config = SelectionConfig {
        strategy: RankingStrategy::Custom,
        reward: RewardMeasure::Auc,
        top_k: 1,
        ..SelectionConfig::default()
    };
    run_to_dir(&inputs(), &config, dir.path()).unwrap();

    let ranked = read_ranked_report(&dir.path().join(RANKED_FILE)).unwrap();
    // Custom order, duplicates dropped, truncated to k
    assert_eq!(ids_for(&ranked, "liver"), vec!["C"]);

    let sig = read_significance_report(&dir.path().join(SIGNIFICANCE_FILE)).unwrap();
    let liver: Vec<_> = sig.iter().filter(|r| r.dataset == "liver").collect();
    assert_eq!(liver.len(), 1);
    // C has no test record
    assert!(liver[0].actual.is_nan());
    // Background: every test record of the endpoint, across datasets
    assert!((liver[0].random - 0.6).abs() < 1e-10);
}

#[test]
fn top_one_against_background_gives_ratio() {
    let dir = tempfile::tempdir().unwrap();
    let config = SelectionConfig {
        composite: CompositeMeasure::Mcc,
        reward: RewardMeasure::Auc,
        top_k: 1,
        ..SelectionConfig::default()
    };
    run_to_dir(&inputs(), &config, dir.path()).unwrap();
    let sig = read_significance_report(&dir.path().join(SIGNIFICANCE_FILE)).unwrap();
    let liver = sig.iter().find(|r| r.dataset == "liver").unwrap();
    assert_eq!(liver.depth, 1);
    assert!((liver.actual - 0.9).abs() < 1e-10);
    assert!((liver.ratio - 1.5).abs() < 1e-10);
    assert!((0.0..=1.0).contains(&liver.p_value));
    assert_eq!(liver.n_resamples, 1000);
}

#[test]
fn same_seed_same_reports() {
    let run = || {
        let dir = tempfile::tempdir().unwrap();
        let config = SelectionConfig {
            threads: Some(2),
            ..SelectionConfig::default()
        };
        run_to_dir(&inputs(), &config, dir.path()).unwrap();
        let mut sig = read_significance_report(&dir.path().join(SIGNIFICANCE_FILE)).unwrap();
        sig.sort_by(|a, b| (&a.dataset, a.depth).cmp(&(&b.dataset, b.depth)));
        sig.into_iter()
            .map(|r| (r.dataset, r.depth, r.seed, r.p_value.to_bits()))
            .collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}

#[test]
fn color_run_on_small_population_selects_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = SelectionConfig {
        strategy: RankingStrategy::Color,
        ..SelectionConfig::default()
    };
    let manifest = run_to_dir(&inputs(), &config, dir.path()).unwrap();
    assert_eq!(manifest.shortlist_sizes["lab:liver/tox"], 0);
    // C and D lack CVCF records
    assert_eq!(manifest.exclusions.missing_cvcf, 2);
    assert_eq!(manifest.exclusions.insufficient_neighbors, 2);
}
