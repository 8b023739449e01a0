//! HTTP API command (`overseer serve`).

use anyhow::Result;
use std::sync::Arc;

use overseer::orchestrator::Orchestrator;
use overseer::run::{InMemoryRunStore, Supervisor};

use crate::Cli;

pub async fn cmd_serve(cli: &Cli, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = super::load_config(cli)?;
    if let Some(host) = host {
        config.toml.server.host = host;
    }
    if let Some(port) = port {
        config.toml.server.port = port;
    }

    for warning in config.validate() {
        tracing::warn!("{warning}");
    }

    let orchestrator = Orchestrator::from_config(&config)?;
    let supervisor = Supervisor::new(Arc::new(orchestrator), Arc::new(InMemoryRunStore::new()));

    overseer::server::start_server(supervisor, &config.toml.server).await
}
