use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender};
use std::thread;

use anyhow::Result;
use tracing::{error, info};

use crate::config::PipelineConfig;
use crate::pipeline::{self, DataOrigin};
use crate::predictor;
use crate::state::{Delta, WorkerCommand};

/// Load, train and rank on a background thread so the terminal stays responsive.
/// Runs once at start and again for every [`WorkerCommand::Reload`].
pub fn spawn_worker(config: PipelineConfig, tx: Sender<Delta>, cmd_rx: Receiver<WorkerCommand>) {
    thread::spawn(move || {
        if run_once(&config, false, &tx).is_err() {
            return;
        }
        while let Ok(cmd) = cmd_rx.recv() {
            let WorkerCommand::Reload { refresh } = cmd;
            if run_once(&config, refresh, &tx).is_err() {
                return;
            }
        }
    });
}

/// `Err` only when the UI side hung up.
fn run_once(
    config: &PipelineConfig,
    refresh: bool,
    tx: &Sender<Delta>,
) -> Result<(), std::sync::mpsc::SendError<Delta>> {
    match load_and_train(config, refresh, tx) {
        Ok(()) => Ok(()),
        Err(err) => {
            error!("pipeline failed: {err:#}");
            tx.send(Delta::Failed(format!("{err:#}")))
        }
    }
}

fn load_and_train(config: &PipelineConfig, refresh: bool, tx: &Sender<Delta>) -> Result<()> {
    let status = if refresh { "fetching" } else { "loading" };
    tx.send(Delta::Status(status.to_string()))?;

    let loaded = pipeline::load_records(config, refresh)?;
    let source = match &loaded.origin {
        DataOrigin::Store { db_path, table } => format!("{} [{table}]", db_path.display()),
        DataOrigin::Remote => "remote csv".to_string(),
    };
    let records = loaded.records;
    tx.send(Delta::Loaded {
        records: records.clone(),
        source,
        warnings: loaded.warnings,
    })?;

    tx.send(Delta::Status("training".to_string()))?;
    let (model, evaluation) = predictor::train_from_records(&records, config)?;
    let current = predictor::prediction_rows(&records, config);
    let predictions = predictor::predict_many(&model, &current, &config.features, None);
    info!(players = predictions.len(), "predictions ranked");
    tx.send(Delta::Log(format!(
        "[INFO] Model fitted on {} rows, {} held out",
        evaluation.split.train.len(),
        evaluation.split.test.len()
    )))?;
    tx.send(Delta::Trained {
        model: Arc::new(model),
        evaluation,
        predictions,
    })?;
    Ok(())
}
