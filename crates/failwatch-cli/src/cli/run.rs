use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use failwatch_core::{FailureReport, FailureStore, Pipeline, RunMode, TrackerMatcher, WatchConfig};

use super::args::Cli;
use crate::exit_codes::SUCCESS;

pub async fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = resolve_config(&cli)?;
    let db_path = config.db_path.clone();
    let keep_db = config.keep_db;

    let store = FailureStore::open(&db_path)
        .with_context(|| format!("failed to open failure store {}", db_path.display()))?;
    let matcher =
        TrackerMatcher::from_config(config.tracker.clone()).context("failed to set up tracker")?;
    let mode = RunMode::from_config(&config);
    tracing::info!(mode = ?mode, db = %db_path.display(), "starting failure scan");

    let pipeline = Pipeline::new(config, store, Arc::new(matcher))?;
    let outcome = pipeline.run(&mode).await;
    // Close the connection before the file goes away.
    drop(pipeline);
    if !keep_db {
        remove_db(&db_path);
    }
    let report = outcome.context("failure scan aborted")?;

    print_report(&report);
    if let Some(path) = &cli.json_out {
        write_json(path, &report)?;
    }
    Ok(SUCCESS)
}

/// Config file, then `FAILWATCH_TRACKER_*`, then flags.
pub fn resolve_config(cli: &Cli) -> anyhow::Result<WatchConfig> {
    let mut config = match &cli.config {
        Some(path) => WatchConfig::load(path)?,
        None => WatchConfig::default(),
    };
    config.tracker = config.tracker.merge_env();
    cli.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn print_report(report: &FailureReport) {
    println!("{}", report.subject);
    println!();
    print!("{}", report.render_text());
}

fn write_json(path: &Path, report: &FailureReport) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write report to {}", path.display()))?;
    tracing::info!(path = %path.display(), "wrote JSON report");
    Ok(())
}

fn remove_db(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed failure store"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not remove failure store"),
    }
}
