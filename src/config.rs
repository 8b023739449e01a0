//! Unified configuration for overseer.
//!
//! Settings are layered: built-in defaults → `overseer.toml` → environment
//! (including a `.env` file) → CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [pipeline]
//! max_retries = 3
//! mode = "adaptive"
//! call_timeout_secs = 120
//! definition = "pipeline.json"
//!
//! [generation]
//! model = "gpt-4o"
//! base_url = "https://api.openai.com/v1"
//! temperature = 0.0
//! timeout_secs = 60
//!
//! [research]
//! model = "sonar"
//! base_url = "https://api.perplexity.ai"
//! timeout_secs = 60
//!
//! [server]
//! host = "0.0.0.0"
//! port = 5000
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::orchestrator::OrchestratorConfig;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "overseer.toml";

/// Gating strategy applied when the auditor rejects an artifact.
///
/// | Mode       | On rejection                                                 |
/// |------------|--------------------------------------------------------------|
/// | `Static`   | Critique is fed back to the worker; instruction is fixed     |
/// | `Adaptive` | Auditor rewrites the worker's instruction before the retry  |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatingMode {
    #[default]
    Static,
    Adaptive,
}

impl std::fmt::Display for GatingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatingMode::Static => write!(f, "static"),
            GatingMode::Adaptive => write!(f, "adaptive"),
        }
    }
}

impl std::str::FromStr for GatingMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "static" => Ok(GatingMode::Static),
            "adaptive" => Ok(GatingMode::Adaptive),
            _ => anyhow::bail!("Invalid gating mode '{}'. Valid values: static, adaptive", s),
        }
    }
}

/// Pipeline execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Retry budget per phase
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Gating strategy
    #[serde(default)]
    pub mode: GatingMode,
    /// Bound on every worker dispatch and auditor backend call
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    /// Optional JSON pipeline definition; the default plan is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<PathBuf>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_call_timeout_secs() -> u64 {
    120
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            mode: GatingMode::default(),
            call_timeout_secs: default_call_timeout_secs(),
            definition: None,
        }
    }
}

/// Text-completion backend settings (OpenAI-compatible API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSection {
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_generation_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_generation_model() -> String {
    "gpt-4o".to_string()
}

fn default_generation_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_http_timeout_secs() -> u64 {
    60
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            model: default_generation_model(),
            base_url: default_generation_base_url(),
            temperature: 0.0,
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

/// Research backend settings (Perplexity-compatible API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchSection {
    #[serde(default = "default_research_model")]
    pub model: String,
    #[serde(default = "default_research_base_url")]
    pub base_url: String,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_research_model() -> String {
    "sonar".to_string()
}

fn default_research_base_url() -> String {
    "https://api.perplexity.ai".to_string()
}

impl Default for ResearchSection {
    fn default() -> Self {
        Self {
            model: default_research_model(),
            base_url: default_research_base_url(),
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

/// HTTP surface settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// The complete overseer.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverseerToml {
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub generation: GenerationSection,
    #[serde(default)]
    pub research: ResearchSection,
    #[serde(default)]
    pub server: ServerSection,
}

impl OverseerToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse overseer.toml")
    }

    /// Load from `path` when it exists, otherwise return defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize overseer.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides. `lookup` is `std::env::var` in
    /// production and a map in tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup("OVERSEER_MODE") {
            self.pipeline.mode = mode.parse()?;
        }
        if let Some(retries) = lookup("OVERSEER_MAX_RETRIES") {
            self.pipeline.max_retries = retries
                .trim()
                .parse()
                .with_context(|| format!("Invalid OVERSEER_MAX_RETRIES '{}'", retries))?;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT '{}'", port))?;
        }
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.pipeline.max_retries == 0 {
            warnings.push(
                "max_retries is 0: every rejected artifact is escalated without a retry"
                    .to_string(),
            );
        }
        if self.pipeline.call_timeout_secs == 0 {
            warnings.push("call_timeout_secs is 0: every backend call will time out".to_string());
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            warnings.push(format!(
                "Invalid temperature {}: should be between 0.0 and 2.0",
                self.generation.temperature
            ));
        }
        if let Some(ref path) = self.pipeline.definition
            && !path.exists()
        {
            warnings.push(format!(
                "Pipeline definition '{}' does not exist",
                path.display()
            ));
        }

        warnings
    }

    /// Orchestrator settings derived from the `[pipeline]` section.
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_retries: self.pipeline.max_retries,
            mode: self.pipeline.mode,
            call_timeout: Duration::from_secs(self.pipeline.call_timeout_secs),
        }
    }
}

/// Effective configuration: the TOML layers plus secrets read from the
/// environment.
#[derive(Debug, Clone, Default)]
pub struct OverseerConfig {
    pub toml: OverseerToml,
    /// Generation backend key; `None` leaves the backend unconfigured
    pub openai_api_key: Option<String>,
    /// Research backend key; `None` selects simulated research
    pub perplexity_api_key: Option<String>,
}

impl OverseerConfig {
    /// Load from an explicit path (which must exist) or from
    /// `overseer.toml` in the working directory (optional), then apply the
    /// process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // A missing .env file is not an error.
        let _ = dotenvy::dotenv();

        let toml = match path {
            Some(p) => OverseerToml::load(p)?,
            None => OverseerToml::load_or_default(Path::new(CONFIG_FILE))?,
        };
        Self::from_toml_with_env(toml, |key| std::env::var(key).ok())
    }

    /// Layer environment values from `lookup` on top of `toml`.
    pub fn from_toml_with_env<F>(mut toml: OverseerToml, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        toml.apply_env(&lookup)?;
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Ok(Self {
            openai_api_key: non_empty("OPENAI_API_KEY"),
            perplexity_api_key: non_empty("PERPLEXITY_API_KEY"),
            toml,
        })
    }

    /// Validate configuration and return warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.toml.validate();
        if self.openai_api_key.is_none() {
            warnings.push(
                "OPENAI_API_KEY not set: drafts are simulated and audits auto-pass".to_string(),
            );
        }
        if self.perplexity_api_key.is_none() {
            warnings.push("PERPLEXITY_API_KEY not set: research is simulated".to_string());
        }
        warnings
    }
}
