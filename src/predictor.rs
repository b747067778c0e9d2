use std::cmp::Ordering;
use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{FeaturePreset, PipelineConfig};
use crate::features::{self, FeatureMatrix, FeatureSchema};
use crate::forest::{ForestConfig, RandomForest};
use crate::metrics::{self, EvaluationMetrics};
use crate::records::{Feature, PlayerGameweekRecord};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FitError {
    #[error("empty training set: no rows survived the missing-data policy")]
    EmptyTrainingSet,
    #[error("only {rows} usable row(s): nothing left to fit after the held-out split")]
    NoTrainingRows { rows: usize },
    #[error("feature matrix has {rows} rows but the target has {targets}")]
    ShapeMismatch { rows: usize, targets: usize },
    #[error("feature matrix rows have differing widths")]
    RaggedRows,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    pub seed: u64,
    pub n_trees: usize,
    pub test_fraction: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            seed: crate::config::DEFAULT_SEED,
            n_trees: crate::config::DEFAULT_TREES,
            test_fraction: crate::config::DEFAULT_TEST_FRACTION,
        }
    }
}

impl From<&PipelineConfig> for FitOptions {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            seed: cfg.seed,
            n_trees: cfg.n_trees,
            test_fraction: cfg.test_fraction,
        }
    }
}

/// Row indices of the two partitions, in shuffled order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Seeded shuffle; the first `ceil(n * test_fraction)` indices are held out.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> TrainTestSplit {
    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    order.shuffle(&mut rng);
    let n_test = ((n as f64) * test_fraction.clamp(0.0, 1.0)).ceil() as usize;
    let train = order.split_off(n_test.min(n));
    TrainTestSplit { train, test: order }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeldOutRow {
    pub name: String,
    pub actual: f64,
    pub predicted: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub metrics: EvaluationMetrics,
    pub split: TrainTestSplit,
    pub held_out: Vec<HeldOutRow>,
}

impl EvaluationReport {
    /// Held-out rows, highest actual points first.
    pub fn held_out_by_actual(&self) -> Vec<&HeldOutRow> {
        let mut rows: Vec<&HeldOutRow> = self.held_out.iter().collect();
        rows.sort_by(|a, b| b.actual.total_cmp(&a.actual).then_with(|| a.name.cmp(&b.name)));
        rows
    }
}

/// A fitted forest plus the column schema it was fitted on. Never refitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    forest: RandomForest,
    schema: FeatureSchema,
}

impl TrainedModel {
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn columns(&self) -> &[String] {
        &self.schema.columns
    }

    pub fn n_trees(&self) -> usize {
        self.forest.n_trees()
    }

    /// Per-row estimates after forcing `matrix` onto the fit-time schema.
    pub fn predict_matrix(&self, matrix: &FeatureMatrix) -> Vec<f64> {
        let aligned = if matrix.columns() == self.schema.columns.as_slice() {
            matrix.clone()
        } else {
            matrix.reindex(&self.schema.columns)
        };
        self.forest.predict(aligned.rows())
    }

    /// Columns paired with their importance, most important first.
    pub fn feature_importances(&self) -> Vec<(String, f64)> {
        let mut out: Vec<(String, f64)> = self
            .schema
            .columns
            .iter()
            .cloned()
            .zip(self.forest.feature_importances().iter().copied())
            .collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out
    }
}

/// Fit a forest on the training partition and score it on the held-out one.
pub fn fit(
    matrix: FeatureMatrix,
    target: Vec<f64>,
    options: &FitOptions,
) -> Result<(TrainedModel, EvaluationReport), FitError> {
    if matrix.is_empty() || target.is_empty() {
        return Err(FitError::EmptyTrainingSet);
    }
    if matrix.n_rows() != target.len() {
        return Err(FitError::ShapeMismatch {
            rows: matrix.n_rows(),
            targets: target.len(),
        });
    }

    let split = train_test_split(matrix.n_rows(), options.test_fraction, options.seed);
    if split.train.is_empty() {
        return Err(FitError::NoTrainingRows {
            rows: matrix.n_rows(),
        });
    }

    let train = matrix.select_rows(&split.train);
    let train_y: Vec<f64> = split.train.iter().map(|&i| target[i]).collect();
    let forest = RandomForest::fit(
        train.rows(),
        &train_y,
        ForestConfig {
            n_trees: options.n_trees,
            seed: options.seed,
            ..Default::default()
        },
    )?;

    let test = matrix.select_rows(&split.test);
    let test_y: Vec<f64> = split.test.iter().map(|&i| target[i]).collect();
    let predictions = forest.predict(test.rows());
    let metrics = metrics::evaluate(&test_y, &predictions);
    info!(
        train_rows = split.train.len(),
        test_rows = split.test.len(),
        columns = matrix.n_cols(),
        mae = metrics.mae,
        rmse = metrics.rmse,
        r2 = metrics.r2,
        "model fitted"
    );

    let held_out = test
        .entities()
        .iter()
        .zip(test_y.iter().zip(&predictions))
        .map(|(name, (actual, predicted))| HeldOutRow {
            name: name.clone(),
            actual: *actual,
            predicted: *predicted,
        })
        .collect();

    let model = TrainedModel {
        forest,
        schema: FeatureSchema::from_columns(matrix.columns()),
    };
    Ok((
        model,
        EvaluationReport {
            metrics,
            split,
            held_out,
        },
    ))
}

/// Build features from `records` (restricted by the configured preset) and fit.
pub fn train_from_records(
    records: &[PlayerGameweekRecord],
    config: &PipelineConfig,
) -> Result<(TrainedModel, EvaluationReport), FitError> {
    let selected: Vec<PlayerGameweekRecord> = records
        .iter()
        .filter(|r| config.preset.includes(r))
        .cloned()
        .collect();
    let (matrix, target) = features::build(&selected, &config.features, config.target);
    debug!(
        input = records.len(),
        preset_rows = selected.len(),
        usable = matrix.n_rows(),
        "training matrix built"
    );
    fit(matrix, target, &FitOptions::from(config))
}

/// Mean of the model's per-row estimates over one player's rows, or `None` when no
/// row has every selected feature.
pub fn predict_one(
    model: &TrainedModel,
    records: &[PlayerGameweekRecord],
    features: &[Feature],
) -> Option<f64> {
    let matrix = features::build_for_prediction(records, features);
    if matrix.is_empty() {
        return None;
    }
    let estimates = model.predict_matrix(&matrix);
    Some(estimates.iter().sum::<f64>() / estimates.len() as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerPrediction {
    pub name: String,
    pub predicted_points: f64,
    pub rows_used: usize,
}

/// Predict every player in `records` and rank by predicted points, highest first.
/// Players without a prediction are left out.
pub fn predict_many(
    model: &TrainedModel,
    records: &[PlayerGameweekRecord],
    features: &[Feature],
    top_n: Option<usize>,
) -> Vec<PlayerPrediction> {
    let mut by_player: BTreeMap<&str, Vec<PlayerGameweekRecord>> = BTreeMap::new();
    for record in records {
        by_player
            .entry(record.name.as_str())
            .or_default()
            .push(record.clone());
    }

    let mut out: Vec<PlayerPrediction> = by_player
        .into_par_iter()
        .filter_map(|(name, rows)| {
            let usable = rows
                .iter()
                .filter(|r| features.iter().all(|f| r.has_feature(*f)))
                .count();
            predict_one(model, &rows, features).map(|predicted_points| PlayerPrediction {
                name: name.to_string(),
                predicted_points,
                rows_used: usable,
            })
        })
        .collect();

    out.sort_by(|a, b| match b.predicted_points.total_cmp(&a.predicted_points) {
        Ordering::Equal => a.name.cmp(&b.name),
        other => other,
    });
    if let Some(n) = top_n {
        out.truncate(n);
    }
    out
}

/// Rows belonging to `name` (trimmed, case-insensitive), optionally within one season.
pub fn records_for_player(
    records: &[PlayerGameweekRecord],
    name: &str,
    season: Option<&str>,
) -> Vec<PlayerGameweekRecord> {
    let wanted = name.trim();
    records
        .iter()
        .filter(|r| r.name.trim().eq_ignore_ascii_case(wanted))
        .filter(|r| season.is_none_or(|s| r.season == s))
        .cloned()
        .collect()
}

/// Result of looking a player up by name for a single-player prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlayerOutcome {
    NotFound,
    /// The player exists but plays a position the active preset leaves out.
    OutsidePreset { position: String },
    /// The player exists but no row carries every selected feature.
    NoPrediction { rows: usize },
    Predicted { points: f64, rows: usize },
}

pub fn lookup_player(
    model: &TrainedModel,
    records: &[PlayerGameweekRecord],
    name: &str,
    season: Option<&str>,
    preset: FeaturePreset,
    features: &[Feature],
) -> PlayerOutcome {
    let all_rows = records_for_player(records, name, season);
    if all_rows.is_empty() {
        return PlayerOutcome::NotFound;
    }
    let rows: Vec<PlayerGameweekRecord> = all_rows
        .iter()
        .filter(|r| preset.includes(r))
        .cloned()
        .collect();
    if rows.is_empty() {
        let position = all_rows
            .iter()
            .find_map(|r| r.position.clone())
            .unwrap_or_else(|| "?".to_string());
        return PlayerOutcome::OutsidePreset { position };
    }
    match predict_one(model, &rows, features) {
        Some(points) => PlayerOutcome::Predicted {
            points,
            rows: rows.len(),
        },
        None => PlayerOutcome::NoPrediction { rows: rows.len() },
    }
}

/// Current-season rows the configured preset admits; the input to rankings.
pub fn prediction_rows(
    records: &[PlayerGameweekRecord],
    config: &PipelineConfig,
) -> Vec<PlayerGameweekRecord> {
    records
        .iter()
        .filter(|r| r.season == config.current_season && config.preset.includes(r))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_sizes_follow_ceil_of_fraction() {
        let split = train_test_split(10, 0.2, 1);
        assert_eq!(split.test.len(), 2);
        assert_eq!(split.train.len(), 8);
        let split = train_test_split(11, 0.2, 1);
        assert_eq!(split.test.len(), 3);

        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..11).collect::<Vec<_>>());
    }

    #[test]
    fn split_is_reproducible_and_seed_sensitive() {
        assert_eq!(train_test_split(50, 0.2, 1), train_test_split(50, 0.2, 1));
        assert_ne!(train_test_split(50, 0.2, 1), train_test_split(50, 0.2, 2));
    }

    #[test]
    fn single_row_cannot_be_fitted() {
        let matrix = FeatureMatrix::new(vec!["minutes".into()], vec![vec![90.0]], vec!["A".into()]);
        let err = fit(matrix, vec![2.0], &FitOptions::default()).unwrap_err();
        assert_eq!(err, FitError::NoTrainingRows { rows: 1 });
    }
}
