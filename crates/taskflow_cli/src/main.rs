//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `taskflow_core` linkage and open the configured store.
//! - Print a deterministic one-line-per-fact summary for local sanity checks.

use std::process::ExitCode;
use std::sync::Arc;
use taskflow_core::views::task_views::stats_by_status;
use taskflow_core::{CoreConfig, DomainStore, SystemClock};

fn main() -> ExitCode {
    println!("taskflow_core ping={}", taskflow_core::ping());
    println!("taskflow_core version={}", taskflow_core::core_version());

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("taskflow: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), String> {
    let config = CoreConfig::from_env().map_err(|err| err.to_string())?;
    if taskflow_core::init_from_config(&config).map_err(|err| err.to_string())? {
        log::info!(
            "event=cli_start module=cli status=ok storage={}",
            config.storage.as_str()
        );
    }

    let store = DomainStore::open(&config, Arc::new(SystemClock))
        .map_err(|err| format!("store open failed: {err}"))?;

    let tasks: Vec<_> = store.tasks().iter().collect();
    let stats = stats_by_status(&tasks);
    println!("storage={} db_path={}", config.storage.as_str(), config.db_path.display());
    println!("users={}", store.users().len());
    println!(
        "tasks total={} todo={} in_progress={} in_review={} completed={}",
        stats.total, stats.todo, stats.in_progress, stats.in_review, stats.completed
    );
    println!("notifications={}", store.notifications().len());

    let report = store
        .close()
        .map_err(|err| format!("store close failed: {err}"))?;
    println!(
        "flush confirmed={} rolled_back={}",
        report.confirmed,
        report.rolled_back.len()
    );
    Ok(())
}
