//! Foreground run command (`overseer run`).

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use overseer::config::GatingMode;
use overseer::observer::RunEvent;
use overseer::orchestrator::Orchestrator;
use overseer::payload::Payload;
use overseer::run::{InMemoryRunStore, RunStatus, Supervisor};

use crate::Cli;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Execute one run and print its events. Returns false when the run failed.
pub async fn cmd_run(
    cli: &Cli,
    input: &Path,
    mode: Option<GatingMode>,
    max_retries: Option<u32>,
    json: bool,
) -> Result<bool> {
    let mut config = super::load_config(cli)?;
    if let Some(mode) = mode {
        config.toml.pipeline.mode = mode;
    }
    if let Some(max_retries) = max_retries {
        config.toml.pipeline.max_retries = max_retries;
    }
    for warning in config.validate() {
        tracing::debug!("{warning}");
    }

    let content = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read input file: {}", input.display()))?;
    let payload: Payload = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse input file: {}", input.display()))?;

    let orchestrator = Orchestrator::from_config(&config)?;
    let supervisor = Supervisor::new(Arc::new(orchestrator), Arc::new(InMemoryRunStore::new()));
    let (run, mut handle) = supervisor.spawn(payload);

    let mut printed = 0;
    let outcome = loop {
        tokio::select! {
            joined = &mut handle => break joined.context("Run task panicked")?,
            _ = tokio::signal::ctrl_c() => {
                run.cancel();
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
        if !json {
            printed = print_events(&run.events().since(printed), printed);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&run.snapshot())?);
    } else {
        print_events(&run.events().since(printed), printed);
        if let Some(result) = outcome.result() {
            println!();
            println!("Result:");
            println!("{result}");
        }
    }

    Ok(outcome.status() == RunStatus::Completed)
}

fn print_events(events: &[RunEvent], printed: usize) -> usize {
    for event in events {
        println!(
            "[{:>9}] {:<10} {}",
            event.kind.as_str(),
            event.role,
            event.message
        );
    }
    printed + events.len()
}
