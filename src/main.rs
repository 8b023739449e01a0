use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use overseer::config::GatingMode;

mod cmd;

#[derive(Parser)]
#[command(name = "overseer")]
#[command(version, about = "Supervised generation pipeline with an auditing gate")]
pub struct Cli {
    /// Raise the log level to debug
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Path to overseer.toml (defaults to ./overseer.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API
    Serve {
        /// Address to bind (overrides [server].host)
        #[arg(long)]
        host: Option<String>,

        /// Port to serve on (overrides [server].port and PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Execute one run in the foreground
    Run {
        /// JSON file holding {"records": [...]}
        #[arg(short, long)]
        input: PathBuf,

        /// Gating mode: static, adaptive
        #[arg(long)]
        mode: Option<GatingMode>,

        /// Retry budget per phase
        #[arg(long)]
        max_retries: Option<u32>,

        /// Print the final snapshot as JSON instead of the event stream
        #[arg(long)]
        json: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default overseer.toml in the working directory
    Init,
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose { "overseer=debug" } else { "overseer=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default.into());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match &cli.command {
        Commands::Serve { host, port } => {
            cmd::cmd_serve(&cli, host.clone(), *port).await?;
        }
        Commands::Run {
            input,
            mode,
            max_retries,
            json,
        } => {
            let ok = cmd::cmd_run(&cli, input, *mode, *max_retries, *json).await?;
            if !ok {
                std::process::exit(1);
            }
        }
        Commands::Config { command } => cmd::cmd_config(&cli, command.clone())?,
    }

    Ok(())
}
