//! Configuration view and validation commands (`overseer config`).

use anyhow::Result;
use std::path::Path;

use overseer::config::{CONFIG_FILE, OverseerToml};

use super::super::{Cli, ConfigCommands};

pub fn cmd_config(cli: &Cli, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| Path::new(CONFIG_FILE).to_path_buf());

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Overseer Configuration");
            println!("======================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No {} found; using defaults.", config_path.display());
            }
            println!();

            let config = super::load_config(cli)?;
            let toml = &config.toml;

            println!("[pipeline]");
            println!("  max_retries = {}", toml.pipeline.max_retries);
            println!("  mode = \"{}\"", toml.pipeline.mode);
            println!("  call_timeout_secs = {}", toml.pipeline.call_timeout_secs);
            if let Some(ref definition) = toml.pipeline.definition {
                println!("  definition = \"{}\"", definition.display());
            }
            println!();

            println!("[generation]");
            println!("  model = \"{}\"", toml.generation.model);
            println!("  base_url = \"{}\"", toml.generation.base_url);
            println!("  temperature = {}", toml.generation.temperature);
            println!("  timeout_secs = {}", toml.generation.timeout_secs);
            println!();

            println!("[research]");
            println!("  model = \"{}\"", toml.research.model);
            println!("  base_url = \"{}\"", toml.research.base_url);
            println!("  timeout_secs = {}", toml.research.timeout_secs);
            println!();

            println!("[server]");
            println!("  host = \"{}\"", toml.server.host);
            println!("  port = {}", toml.server.port);
            println!();

            println!("Backends (from environment):");
            println!(
                "  generation = {}",
                if config.openai_api_key.is_some() { "configured" } else { "simulated" }
            );
            println!(
                "  research = {}",
                if config.perplexity_api_key.is_some() { "configured" } else { "simulated" }
            );
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let config = super::load_config(cli)?;
            let warnings = config.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("{} already exists", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            OverseerToml::default().save(&config_path)?;

            println!("Created {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [pipeline] max_retries, mode, call_timeout_secs, definition");
            println!("  - [generation] / [research] model and endpoint");
            println!("  - [server] host, port");
            println!();
        }
    }

    Ok(())
}
