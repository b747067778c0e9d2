use std::fs::File;

use fpl_forecast::config::{FeaturePreset, PipelineConfig};
use fpl_forecast::data_source::parse_season_csv;
use fpl_forecast::features::{self, FeatureMatrix};
use fpl_forecast::predictor::{
    self, FitError, FitOptions, PlayerOutcome, TrainedModel, predict_many, predict_one,
};
use fpl_forecast::records::{Feature, PlayerGameweekRecord, Target};

fn fixture_records() -> Vec<PlayerGameweekRecord> {
    let file = File::open("tests/fixtures/merged_gw_sample.csv").expect("fixture present");
    parse_season_csv(file, "2023-24").expect("fixture parses").records
}

fn small_config() -> PipelineConfig {
    PipelineConfig {
        n_trees: 25,
        db_path: None,
        current_season: "2023-24".to_string(),
        ..PipelineConfig::default()
    }
}

fn trained() -> TrainedModel {
    let (model, _) = predictor::train_from_records(&fixture_records(), &small_config())
        .expect("fixture trains");
    model
}

#[test]
fn fitting_is_deterministic_for_a_seed() {
    let records = fixture_records();
    let config = small_config();
    let (model_a, eval_a) = predictor::train_from_records(&records, &config).unwrap();
    let (model_b, eval_b) = predictor::train_from_records(&records, &config).unwrap();

    assert_eq!(eval_a.split, eval_b.split);
    assert_eq!(eval_a.metrics.mae, eval_b.metrics.mae);
    assert_eq!(eval_a.metrics.rmse, eval_b.metrics.rmse);
    let (r2_a, r2_b) = (eval_a.metrics.r2, eval_b.metrics.r2);
    assert!(r2_a.to_bits() == r2_b.to_bits() || (r2_a.is_nan() && r2_b.is_nan()));
    assert_eq!(eval_a.held_out, eval_b.held_out);
    assert_eq!(model_a.columns(), model_b.columns());

    let (matrix, _) = features::build(&records, &config.features, Target::TotalPoints);
    assert_eq!(model_a.predict_matrix(&matrix), model_b.predict_matrix(&matrix));
}

#[test]
fn held_out_metrics_are_consistent() {
    let (_, eval) = predictor::train_from_records(&fixture_records(), &small_config()).unwrap();
    let m = eval.metrics;
    // 39 complete rows (one has no xG), ceil(39 * 0.2) = 8 held out.
    assert_eq!(m.samples, 8);
    assert_eq!(eval.split.train.len(), 31);
    assert!(m.mae >= 0.0);
    assert!(m.rmse >= m.mae);
    assert!(m.r2.is_nan() || m.r2 <= 1.0);
    assert_eq!(eval.held_out.len(), 8);
}

#[test]
fn schema_follows_selection_then_opponents() {
    let model = trained();
    let columns = model.columns();
    assert_eq!(columns[0], "minutes");
    let first_opponent = columns
        .iter()
        .position(|c| c.starts_with("opponent_team_"))
        .expect("opponent columns present");
    assert!(columns[first_opponent..].iter().all(|c| c.starts_with("opponent_team_")));
    // Fixture opponents are 3, 7, 12, 15, 19; 3 is the reference level.
    assert_eq!(
        &columns[first_opponent..],
        &["opponent_team_7", "opponent_team_12", "opponent_team_15", "opponent_team_19"]
    );
    assert!(columns.contains(&"was_home".to_string()));
}

#[test]
fn predict_one_averages_the_model_estimates() {
    // Points follow goals exactly, so the forest learns 2 + 5 * goals.
    let history: Vec<PlayerGameweekRecord> = (0..80u32)
        .map(|i| {
            let goals = i % 4;
            PlayerGameweekRecord {
                minutes: Some(90),
                goals_scored: Some(goals),
                total_points: Some(2 + 5 * goals as i32),
                ..PlayerGameweekRecord::new(format!("Trainee {i}"), "2023-24")
            }
        })
        .collect();
    let features = vec![Feature::Minutes, Feature::GoalsScored];
    let config = PipelineConfig {
        features: features.clone(),
        ..small_config()
    };
    let (model, _) = predictor::train_from_records(&history, &config).unwrap();
    assert_eq!(model.columns(), &["minutes", "goals_scored"]);

    let rows: Vec<PlayerGameweekRecord> = [(1, 6), (0, 2), (2, 9)]
        .iter()
        .map(|&(goals, points)| PlayerGameweekRecord {
            minutes: Some(90),
            goals_scored: Some(goals),
            total_points: Some(points),
            ..PlayerGameweekRecord::new("Test Player", "2023-24")
        })
        .collect();
    let got = predict_one(&model, &rows, &features).expect("three complete rows");

    let by_hand = FeatureMatrix::new(
        model.columns().to_vec(),
        vec![vec![90.0, 1.0], vec![90.0, 0.0], vec![90.0, 2.0]],
        vec!["Test Player".to_string(); 3],
    );
    let estimates = model.predict_matrix(&by_hand);
    let expected = estimates.iter().sum::<f64>() / 3.0;
    assert!((got - expected).abs() < 1e-12);

    // The estimate comes from the fitted relation, not the player's own points.
    assert!((got - 7.0).abs() < 1.0, "got {got}");
    assert!((got - 17.0 / 3.0).abs() > 0.5, "got {got}");
}

#[test]
fn predict_one_without_complete_rows_is_none() {
    let model = trained();
    let rows = vec![PlayerGameweekRecord {
        minutes: Some(90),
        ..PlayerGameweekRecord::new("Nobody", "2023-24")
    }];
    assert_eq!(predict_one(&model, &rows, &[Feature::Minutes, Feature::Bps]), None);
    assert_eq!(predict_one(&model, &[], &[Feature::Minutes]), None);
}

#[test]
fn lookup_distinguishes_unknown_and_incomplete_players() {
    let model = trained();
    let records = fixture_records();
    let features = FeaturePreset::AllPositions.features();
    let lookup = |name: &str, season: &str| {
        predictor::lookup_player(
            &model,
            &records,
            name,
            Some(season),
            FeaturePreset::AllPositions,
            &features,
        )
    };

    assert_eq!(lookup("Nobody At All", "2023-24"), PlayerOutcome::NotFound);
    match lookup("  erling haaland ", "2023-24") {
        PlayerOutcome::Predicted { rows, points } => {
            assert_eq!(rows, 5);
            assert!(points.is_finite());
        }
        other => panic!("expected a prediction, got {other:?}"),
    }
    assert_eq!(lookup("Erling Haaland", "2022-23"), PlayerOutcome::NotFound);
}

#[test]
fn ranking_covers_every_player_with_complete_rows() {
    let model = trained();
    let records = fixture_records();
    let ranked = predict_many(&model, &records, &small_config().features, None);
    assert_eq!(ranked.len(), 8);
    assert!(ranked.windows(2).all(|w| w[0].predicted_points >= w[1].predicted_points));
    let palmer = ranked.iter().find(|p| p.name == "Cole Palmer").unwrap();
    assert_eq!(palmer.rows_used, 4);

    let top3 = predict_many(&model, &records, &small_config().features, Some(3));
    assert_eq!(top3.len(), 3);
    assert_eq!(top3[0], ranked[0]);
}

#[test]
fn empty_training_set_is_an_error() {
    let records: Vec<PlayerGameweekRecord> = fixture_records()
        .into_iter()
        .map(|mut r| {
            r.total_points = None;
            r
        })
        .collect();
    let err = predictor::train_from_records(&records, &small_config()).unwrap_err();
    assert_eq!(err, FitError::EmptyTrainingSet);

    let (matrix, y) = features::build(&[], &[Feature::Minutes], Target::TotalPoints);
    assert_eq!(
        predictor::fit(matrix, y, &FitOptions::default()).unwrap_err(),
        FitError::EmptyTrainingSet
    );
}

#[test]
fn attackers_preset_trains_on_midfielders_and_forwards() {
    let mut config = small_config();
    config.set_preset(FeaturePreset::Attackers);
    let (model, eval) = predictor::train_from_records(&fixture_records(), &config).unwrap();
    // 5 attackers x 5 gameweeks, minus Palmer's row without xG.
    assert_eq!(eval.split.train.len() + eval.split.test.len(), 24);
    assert!(!model.columns().contains(&"saves".to_string()));
}

#[test]
fn attackers_ranking_and_lookup_skip_defenders_and_keepers() {
    let mut config = small_config();
    config.set_preset(FeaturePreset::Attackers);
    let records = fixture_records();
    let (model, _) = predictor::train_from_records(&records, &config).unwrap();

    let current = predictor::prediction_rows(&records, &config);
    assert!(current.iter().all(PlayerGameweekRecord::is_attacker));
    let ranked = predict_many(&model, &current, &config.features, None);
    assert_eq!(ranked.len(), 5);
    for name in ["Jordan Pickford", "Pervis Estupinan", "William Saliba"] {
        assert!(ranked.iter().all(|p| p.name != name), "{name} ranked");
    }

    assert_eq!(
        predictor::lookup_player(
            &model,
            &records,
            "Jordan Pickford",
            Some("2023-24"),
            config.preset,
            &config.features
        ),
        PlayerOutcome::OutsidePreset {
            position: "GK".to_string()
        }
    );
    assert!(matches!(
        predictor::lookup_player(
            &model,
            &records,
            "Bukayo Saka",
            Some("2023-24"),
            config.preset,
            &config.features
        ),
        PlayerOutcome::Predicted { rows: 5, .. }
    ));
}
