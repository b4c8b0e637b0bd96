use epi_scorer::output::{summary_json, write_scores_csv};
use epi_scorer::scoring::{all_scores, score_stratified};
use epi_scorer::table::{ObservationSchema, Observations, PredictionSchema, Predictions, RawTable};
use epi_scorer::{ScoreError, ScoringConfig};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn observations(csv: &str, cols: &[&str]) -> Observations {
    let raw = RawTable::from_csv_bytes(csv.as_bytes()).expect("Failed to read observations");
    let schema = ObservationSchema::default().with_other_ind_cols(cols);
    Observations::from_raw(&raw, &schema).expect("Failed to build observations")
}

fn predictions(csv: &str, cols: &[&str]) -> Predictions {
    let raw = RawTable::from_csv_bytes(csv.as_bytes()).expect("Failed to read predictions");
    let schema = PredictionSchema::default().with_other_ind_cols(cols);
    Predictions::from_raw(&raw, &schema).expect("Failed to build predictions")
}

fn ranges(r: &[u32]) -> ScoringConfig {
    ScoringConfig {
        interval_ranges: r.to_vec(),
        ..ScoringConfig::default()
    }
}

const SINGLE_LOC_OBS: &str = "date,value\n2019-12-04,1\n2019-12-11,1\n";

const SINGLE_LOC_PREDS: &str = "\
target_end_date,quantile,type,value
2019-12-04,0.25,quantile,0
2019-12-04,0.5,quantile,2
2019-12-04,0.75,quantile,2
2019-12-11,0.25,quantile,0
2019-12-11,0.5,quantile,2
2019-12-11,0.75,quantile,2
";

#[test]
fn test_single_location_wis() {
    init_tracing();
    let obs = observations(SINGLE_LOC_OBS, &[]);
    let preds = predictions(SINGLE_LOC_PREDS, &[]);

    let eval = all_scores(&obs, &preds, &ranges(&[50])).unwrap();

    let expected = (2.0 / 4.0 + 1.0 / 2.0) / 1.5;
    for w in eval.scores.column("wis").unwrap() {
        assert!((w - expected).abs() < 1e-12);
    }
    assert_eq!(eval.scores.column("50_interval_score"), Some(vec![2.0, 2.0]));
    assert_eq!(eval.summary.nb_t_match, 2);
    assert!((eval.summary.wis_total.unwrap() - 2.0 * expected).abs() < 1e-12);
    assert_eq!(eval.summary.coverage[&50], 1.0);
}

#[test]
fn test_multi_location_strata_score_identically() {
    init_tracing();
    let obs = observations(
        "location,date,value\n\
         AL,2019-12-04,1\nAL,2019-12-11,1\nMA,2019-12-04,1\nMA,2019-12-11,1\n",
        &["location"],
    );
    let mut preds_csv = String::from("location,target_end_date,quantile,type,value\n");
    for loc in ["AL", "MA"] {
        for line in SINGLE_LOC_PREDS.lines().skip(1) {
            preds_csv.push_str(&format!("{},{}\n", loc, line));
        }
    }
    let preds = predictions(&preds_csv, &["location"]);

    let result = score_stratified(&obs, &preds, &ranges(&[50])).unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(
        result.get(&["AL"]).unwrap().summary,
        result.get(&["MA"]).unwrap().summary
    );

    let table = result.combined_table().unwrap();
    assert_eq!(table.len(), 4);
    let keys: Vec<String> = table.rows.iter().map(|r| r.key.to_string()).collect();
    assert_eq!(
        keys,
        vec!["2019-12-04/AL", "2019-12-04/MA", "2019-12-11/AL", "2019-12-11/MA"]
    );
}

#[test]
fn test_coverage_scenario() {
    let obs = observations("date,value\n2019-12-04,0.9\n2019-12-11,1\n", &[]);
    let mut csv = String::from("target_end_date,quantile,value\n");
    for day in ["2019-12-04", "2019-12-11"] {
        for (q, v) in [(0.05, 0.0), (0.25, 0.5), (0.5, 0.9), (0.75, 0.99), (0.95, 2.0)] {
            csv.push_str(&format!("{},{},{}\n", day, q, v));
        }
    }
    let preds = predictions(&csv, &[]);

    let eval = all_scores(&obs, &preds, &ranges(&[50, 90])).unwrap();
    assert_eq!(eval.summary.coverage[&50], 0.5);
    assert_eq!(eval.summary.coverage[&90], 1.0);
}

#[test]
fn test_key_mismatch_is_an_error_unless_allowed() {
    let obs = observations("date,value\n2019-12-04,1\n2019-12-11,1\n2019-12-18,1\n", &[]);
    let preds = predictions(SINGLE_LOC_PREDS, &[]);

    let err = all_scores(&obs, &preds, &ranges(&[50])).unwrap_err();
    assert!(matches!(err, ScoreError::KeyMismatch { .. }));

    let config = ScoringConfig {
        mismatched_allowed: true,
        ..ranges(&[50])
    };
    let eval = all_scores(&obs, &preds, &config).unwrap();
    assert_eq!(eval.summary.nb_t_match, 2);
}

#[test]
fn test_absolute_error_only_mode() {
    let obs = observations(SINGLE_LOC_OBS, &[]);
    let preds = predictions(
        "target_end_date,quantile,type,value\n\
         2019-12-04,,point,4\n2019-12-04,0.5,quantile,2\n2019-12-11,0.5,quantile,2\n",
        &[],
    );

    let eval = all_scores(&obs, &preds, &ranges(&[])).unwrap();
    assert_eq!(eval.scores.column("point_absolute_error"), Some(vec![3.0, 1.0]));
    assert_eq!(eval.scores.column("wis"), None);
    assert_eq!(eval.summary.nb_t_match, 2);

    let json = summary_json(&eval.summary).unwrap();
    assert!(!json.contains("wis"));
    assert!(json.contains("\"point_absolute_error_total\": 4.0"));
}

#[test]
fn test_gzipped_predictions_to_csv_report() {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(SINGLE_LOC_PREDS.as_bytes()).unwrap();
    let gz = encoder.finish().unwrap();

    let raw = RawTable::from_csv_bytes(&gz).unwrap();
    let preds = Predictions::from_raw(&raw, &PredictionSchema::default()).unwrap();
    let obs = observations(SINGLE_LOC_OBS, &[]);

    let eval = all_scores(&obs, &preds, &ranges(&[50])).unwrap();
    let mut buf = Vec::new();
    write_scores_csv(&eval.scores, &mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();

    assert_eq!(text.lines().count(), 3);
    assert!(text.starts_with("date,50_interval_score,"));
}

#[test]
fn test_scenario_column_stratified_against_unlabelled_truth() {
    init_tracing();
    let obs = observations(SINGLE_LOC_OBS, &[]);
    let mut csv = String::from("scenario_id,target_end_date,quantile,value\n");
    for (scenario, shift) in [("A", 0.0), ("B", 1.0)] {
        for day in ["2019-12-04", "2019-12-11"] {
            for (q, v) in [(0.25, 0.0), (0.5, 2.0), (0.75, 2.0)] {
                csv.push_str(&format!("{},{},{},{}\n", scenario, day, q, v + shift));
            }
        }
    }
    let preds = predictions(&csv, &["scenario_id"]);

    // unstratified, the two scenarios collide on the observation key
    let unstratified = ScoringConfig {
        stratify_by: Some(vec![]),
        ..ranges(&[50])
    };
    assert!(matches!(
        score_stratified(&obs, &preds, &unstratified),
        Err(ScoreError::DuplicateKey(_))
    ));

    let result = score_stratified(&obs, &preds, &ranges(&[50])).unwrap();
    let a = result.get(&["A"]).unwrap().summary.wis_mean.unwrap();
    let b = result.get(&["B"]).unwrap().summary.wis_mean.unwrap();
    assert!(b > a);

    let table = result.combined_table().unwrap();
    assert_eq!(table.other_ind_cols, vec!["scenario_id"]);
    assert_eq!(table.len(), 4);
}
