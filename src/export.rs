use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::analysis::SeasonTotals;
use crate::metrics::format_metric;
use crate::predictor::{EvaluationReport, PlayerPrediction, TrainedModel};

pub struct ExportReport {
    pub sheets: usize,
    pub rows: usize,
}

/// Everything the xlsx report is built from.
pub struct ReportInput<'a> {
    pub model: &'a TrainedModel,
    pub evaluation: &'a EvaluationReport,
    pub predictions: &'a [PlayerPrediction],
    pub totals: &'a [SeasonTotals],
    pub season: &'a str,
}

pub fn export_report(path: &Path, input: &ReportInput<'_>) -> Result<ExportReport> {
    let sheets: Vec<(&str, Vec<Vec<String>>)> = vec![
        ("Metrics", metrics_rows(input)),
        ("Top Predicted", prediction_rows(input.predictions)),
        ("Held Out", held_out_rows(input.evaluation)),
        ("Season Totals", totals_rows(input.totals)),
        ("Feature Importance", importance_rows(input.model)),
    ];

    let mut workbook = Workbook::new();
    let mut rows = 0usize;
    for (name, data) in &sheets {
        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name(*name)
            .with_context(|| format!("name sheet {name}"))?;
        write_rows(worksheet, data)?;
        rows += data.len().saturating_sub(1);
    }

    workbook
        .save(path)
        .with_context(|| format!("save workbook {}", path.display()))?;
    Ok(ExportReport {
        sheets: sheets.len(),
        rows,
    })
}

fn metrics_rows(input: &ReportInput<'_>) -> Vec<Vec<String>> {
    let m = &input.evaluation.metrics;
    vec![
        vec!["Metric".to_string(), "Value".to_string()],
        vec!["Season".to_string(), input.season.to_string()],
        vec!["Held-out rows".to_string(), m.samples.to_string()],
        vec![
            "Training rows".to_string(),
            input.evaluation.split.train.len().to_string(),
        ],
        vec!["Trees".to_string(), input.model.n_trees().to_string()],
        vec!["MAE".to_string(), format_metric(m.mae)],
        vec!["RMSE".to_string(), format_metric(m.rmse)],
        vec!["R2".to_string(), format_metric(m.r2)],
    ]
}

fn prediction_rows(predictions: &[PlayerPrediction]) -> Vec<Vec<String>> {
    let mut rows = vec![vec![
        "Rank".to_string(),
        "Player".to_string(),
        "Predicted Points".to_string(),
        "Rows Used".to_string(),
    ]];
    rows.extend(predictions.iter().enumerate().map(|(idx, p)| {
        vec![
            (idx + 1).to_string(),
            p.name.clone(),
            format!("{:.3}", p.predicted_points),
            p.rows_used.to_string(),
        ]
    }));
    rows
}

fn held_out_rows(evaluation: &EvaluationReport) -> Vec<Vec<String>> {
    let mut rows = vec![vec![
        "Player".to_string(),
        "Actual Total Points".to_string(),
        "Predicted Total Points".to_string(),
    ]];
    rows.extend(evaluation.held_out_by_actual().into_iter().map(|r| {
        vec![
            r.name.clone(),
            format!("{:.0}", r.actual),
            format!("{:.3}", r.predicted),
        ]
    }));
    rows
}

fn totals_rows(totals: &[SeasonTotals]) -> Vec<Vec<String>> {
    let mut rows = vec![vec![
        "Player".to_string(),
        "Position".to_string(),
        "Team".to_string(),
        "Appearances".to_string(),
        "Total Points".to_string(),
        "Goals".to_string(),
        "Assists".to_string(),
        "xG".to_string(),
        "xA".to_string(),
        "Minutes".to_string(),
    ]];
    rows.extend(totals.iter().map(|t| {
        vec![
            t.name.clone(),
            t.position.clone(),
            t.team.clone(),
            t.appearances.to_string(),
            t.total_points.to_string(),
            t.goals_scored.to_string(),
            t.assists.to_string(),
            format!("{:.2}", t.expected_goals),
            format!("{:.2}", t.expected_assists),
            t.minutes.to_string(),
        ]
    }));
    rows
}

fn importance_rows(model: &TrainedModel) -> Vec<Vec<String>> {
    let mut rows = vec![vec!["Column".to_string(), "Importance".to_string()]];
    rows.extend(
        model
            .feature_importances()
            .into_iter()
            .map(|(column, value)| vec![column, format!("{value:.4}")]),
    );
    rows
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}
