use std::path::PathBuf;

use anyhow::{Context, Result};

use fpl_forecast::analysis;
use fpl_forecast::config::{PipelineConfig, arg_value, has_flag};
use fpl_forecast::export::{self, ReportInput};
use fpl_forecast::metrics::format_metric;
use fpl_forecast::pipeline::{self, DataOrigin};
use fpl_forecast::predictor::{self, PlayerOutcome};
use fpl_forecast::logging;

const DEFAULT_TOP: usize = 20;

fn main() -> Result<()> {
    logging::init_stderr();
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut config = PipelineConfig::from_env().context("read FPL_* configuration")?;
    config.apply_args(&args).context("parse arguments")?;
    let top_n = match arg_value(&args, "--top") {
        Some(raw) => raw
            .parse::<usize>()
            .with_context(|| format!("invalid --top value `{raw}`"))?,
        None => DEFAULT_TOP,
    };

    let loaded = pipeline::load_records(&config, has_flag(&args, "--refresh"))?;
    match &loaded.origin {
        DataOrigin::Store { db_path, table } => {
            println!("Data: {} rows from {} ({table})", loaded.records.len(), db_path.display())
        }
        DataOrigin::Remote => println!("Data: {} rows fetched", loaded.records.len()),
    }
    for warning in &loaded.warnings {
        println!("Warning: {warning}");
    }

    let (model, evaluation) = predictor::train_from_records(&loaded.records, &config)?;
    let m = &evaluation.metrics;
    println!(
        "Model: {} trees, {} columns, preset {}",
        model.n_trees(),
        model.columns().len(),
        config.preset.label()
    );
    println!(
        "Held-out ({} rows): MAE {}  RMSE {}  R2 {}",
        m.samples,
        format_metric(m.mae),
        format_metric(m.rmse),
        format_metric(m.r2)
    );

    let current = predictor::prediction_rows(&loaded.records, &config);
    let predictions = predictor::predict_many(&model, &current, &config.features, Some(top_n));
    println!("Top {} predicted for {}", predictions.len(), config.current_season);
    for (idx, p) in predictions.iter().enumerate() {
        println!(
            "{:>3}. {:<28} {:>7.3}  ({} rows)",
            idx + 1,
            p.name,
            p.predicted_points,
            p.rows_used
        );
    }

    if let Some(name) = arg_value(&args, "--player") {
        let outcome = predictor::lookup_player(
            &model,
            &loaded.records,
            &name,
            Some(config.current_season.as_str()),
            config.preset,
            &config.features,
        );
        match outcome {
            PlayerOutcome::NotFound => {
                println!("{name}: player not found in {}", config.current_season)
            }
            PlayerOutcome::OutsidePreset { position } => {
                println!("{name}: {position} is outside the {} preset", config.preset.label())
            }
            PlayerOutcome::NoPrediction { rows } => {
                println!("{name}: no prediction available ({rows} rows, none complete)")
            }
            PlayerOutcome::Predicted { points, rows } => {
                println!("{name}: predicted total points {points:.3} (from {rows} rows)")
            }
        }
    }

    if let Some(path) = arg_value(&args, "--xlsx").map(PathBuf::from) {
        let totals = analysis::season_totals(analysis::records_for_season(
            &loaded.records,
            &config.current_season,
        ));
        let report = export::export_report(
            &path,
            &ReportInput {
                model: &model,
                evaluation: &evaluation,
                predictions: &predictions,
                totals: &totals,
                season: &config.current_season,
            },
        )?;
        println!(
            "Report: {} ({} sheets, {} rows)",
            path.display(),
            report.sheets,
            report.rows
        );
    }

    Ok(())
}
