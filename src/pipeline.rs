use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::data_source::{self, SeasonFetch, SeasonLoad};
use crate::records::PlayerGameweekRecord;
use crate::store::{self, IngestRun};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataOrigin {
    Store { db_path: PathBuf, table: String },
    Remote,
}

#[derive(Debug, Clone)]
pub struct LoadedData {
    pub records: Vec<PlayerGameweekRecord>,
    pub origin: DataOrigin,
    /// One message per season that failed to load.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct IngestSummary {
    pub db_path: Option<PathBuf>,
    pub table: String,
    pub seasons_total: usize,
    pub seasons_succeeded: usize,
    pub rows_written: usize,
    pub per_season: Vec<(String, usize)>,
    pub errors: Vec<String>,
}

/// Fetch every configured season and, when a database path is configured,
/// overwrite the player table with the combined rows.
pub fn ingest(config: &PipelineConfig) -> Result<IngestSummary> {
    let started_at = Utc::now().to_rfc3339();
    let load = data_source::load_all(config)?;
    persist_load(config, &load, started_at)
}

pub fn persist_load(
    config: &PipelineConfig,
    load: &SeasonLoad,
    started_at: String,
) -> Result<IngestSummary> {
    let errors = failure_messages(load);
    let per_season = load
        .seasons
        .iter()
        .map(|s| (s.season().to_string(), s.records().len()))
        .collect();
    let records = load.combined();

    let mut rows_written = 0usize;
    if load.succeeded() == 0 {
        warn!("every season failed; keeping the existing player table");
    } else if let Some(db_path) = config.db_path.as_ref() {
        let mut conn = store::open_db(db_path)?;
        rows_written = store::write_players(&mut conn, &config.table, &records)?;
        store::record_ingest_run(
            &conn,
            &IngestRun {
                table: config.table.clone(),
                started_at,
                seasons_total: load.seasons.len(),
                seasons_succeeded: load.succeeded(),
                rows_written,
                errors: errors.clone(),
            },
        )?;
        info!(
            db = %db_path.display(),
            table = config.table.as_str(),
            rows = rows_written,
            "player table replaced"
        );
    } else {
        warn!("no database path configured; skipping persistence");
    }

    Ok(IngestSummary {
        db_path: config.db_path.clone(),
        table: config.table.clone(),
        seasons_total: load.seasons.len(),
        seasons_succeeded: load.succeeded(),
        rows_written,
        per_season,
        errors,
    })
}

/// Rows for training and display: the stored table when it has rows (and
/// `refresh` is false), otherwise a fresh fetch that is written back.
pub fn load_records(config: &PipelineConfig, refresh: bool) -> Result<LoadedData> {
    if !refresh && let Some(db_path) = config.db_path.as_ref() && db_path.exists() {
        let conn = store::open_db(db_path)?;
        let records = store::read_players(&conn, &config.table)
            .with_context(|| format!("read table {}", config.table))?;
        if !records.is_empty() {
            info!(rows = records.len(), table = config.table.as_str(), "loaded from store");
            return Ok(LoadedData {
                records,
                origin: DataOrigin::Store {
                    db_path: db_path.clone(),
                    table: config.table.clone(),
                },
                warnings: Vec::new(),
            });
        }
    }

    let started_at = Utc::now().to_rfc3339();
    let load = data_source::load_all(config)?;
    let warnings = failure_messages(&load);
    if config.db_path.is_some()
        && let Err(err) = persist_load(config, &load, started_at)
    {
        warn!("could not cache fetched rows: {err:#}");
    }
    Ok(LoadedData {
        records: load.into_combined(),
        origin: DataOrigin::Remote,
        warnings,
    })
}

fn failure_messages(load: &SeasonLoad) -> Vec<String> {
    load.failures()
        .filter_map(|f| match f {
            SeasonFetch::Failed { season, error } => Some(format!("season {season}: {error}")),
            SeasonFetch::Loaded { .. } => None,
        })
        .collect()
}
