use anyhow::{Context, Result};

use fpl_forecast::config::PipelineConfig;
use fpl_forecast::{logging, pipeline};

fn main() -> Result<()> {
    logging::init_stderr();
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut config = PipelineConfig::from_env().context("read FPL_* configuration")?;
    config.apply_args(&args).context("parse arguments")?;
    if config.db_path.is_none() {
        anyhow::bail!("unable to resolve sqlite path; pass --db or set FPL_DB_PATH");
    }

    let summary = pipeline::ingest(&config)?;

    println!("FPL gameweek ingest complete");
    if let Some(db) = summary.db_path.as_ref() {
        println!("DB: {} (table {})", db.display(), summary.table);
    }
    println!(
        "Seasons: {}/{}",
        summary.seasons_succeeded, summary.seasons_total
    );
    for (season, rows) in &summary.per_season {
        println!(" - {season}: {rows} rows");
    }
    println!("Rows written: {}", summary.rows_written);
    if !summary.errors.is_empty() {
        println!("Errors: {}", summary.errors.len());
        for err in summary.errors.iter().take(8) {
            println!(" - {err}");
        }
    }
    if summary.seasons_succeeded == 0 {
        anyhow::bail!("no season could be loaded");
    }

    Ok(())
}
