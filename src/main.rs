mod advice;
mod completion;
mod config;
mod db;
mod models;
mod period;
mod run;

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    let config = config::Config::from_env()?;
    let db_path = match &config.db_path {
        Some(path) => path.clone(),
        None => get_db_path()?,
    };
    let mut db = db::Database::open(&db_path)?;

    run::as_cli(&args, &mut db, &config)
}

/// `RUST_LOG` wins, then `MONEYMIND_LOG`, then warnings only. Logs go to
/// stderr so report output on stdout stays clean.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env("MONEYMIND_LOG"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn get_db_path() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "moneymind", "MoneyMind")
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
    let data_dir = proj_dirs.data_dir();
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    Ok(data_dir.join("moneymind.db"))
}
