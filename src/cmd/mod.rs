//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `serve`  | `Serve`          |
//! | `run`    | `Run`            |
//! | `config` | `Config`         |

pub mod config;
pub mod run;
pub mod serve;

pub use config::cmd_config;
pub use run::cmd_run;
pub use serve::cmd_serve;

use anyhow::Result;
use overseer::config::OverseerConfig;

use crate::Cli;

/// Load configuration honoring the global `--config` flag.
pub fn load_config(cli: &Cli) -> Result<OverseerConfig> {
    OverseerConfig::load(cli.config.as_deref())
}
