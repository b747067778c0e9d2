use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::http_cache::app_cache_dir;

const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// stderr subscriber for the command-line tools, filtered by `RUST_LOG`.
pub fn init_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// File subscriber for the dashboard, which owns the terminal. Returns the log path.
pub fn init_file(name: &str) -> Result<PathBuf> {
    let dir = app_cache_dir().unwrap_or_else(std::env::temp_dir);
    fs::create_dir_all(&dir).with_context(|| format!("create log dir {}", dir.display()))?;
    let path = dir.join(name);
    let file = File::create(&path).with_context(|| format!("create log {}", path.display()))?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();
    Ok(path)
}
