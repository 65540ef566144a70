//! Loading `ContextConfig` from `config.toml`.
//!
//! Lookup order for the home directory:
//!   1. `$CONTEXT_KEEPER_HOME`
//!   2. `~/.context-keeper`
//!
//! Every key in `config.toml` is optional; missing keys keep their defaults.

use crate::{ContextConfig, ContextError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Environment variable overriding the home directory
pub const HOME_ENV: &str = "CONTEXT_KEEPER_HOME";

/// Which context strategy a manager runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    Simple,
    RollingSummary,
    Retrieval,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simple => write!(f, "simple"),
            Self::RollingSummary => write!(f, "rolling_summary"),
            Self::Retrieval => write!(f, "retrieval"),
        }
    }
}

/// On-disk shape of `config.toml`
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    contexts_dir: Option<PathBuf>,
    model: Option<String>,
    strategy: Option<StrategyKind>,
    summary_threshold: Option<usize>,
    top_k: Option<usize>,
    credentials_env: Option<String>,
}

/// Resolve the Context Keeper home directory
pub fn home_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var(HOME_ENV) {
        return Ok(PathBuf::from(home));
    }

    let home = dirs::home_dir().ok_or_else(|| {
        ContextError::Configuration("Could not find home directory".to_string())
    })?;
    Ok(home.join(".context-keeper"))
}

/// Load configuration from `{home}/config.toml`, falling back to defaults.
pub async fn load(home: &Path) -> Result<ContextConfig> {
    let config_file = home.join("config.toml");
    let defaults = ContextConfig::new(home.to_path_buf());

    if !config_file.exists() {
        debug!("No config file at {:?}, using defaults", config_file);
        return Ok(defaults);
    }

    let content = fs::read_to_string(&config_file).await?;
    let config = apply(defaults, &content)?;
    config.validate()?;
    debug!("Loaded config from {:?}", config_file);
    Ok(config)
}

/// Overlay the keys present in `content` onto `config`.
pub fn apply(mut config: ContextConfig, content: &str) -> Result<ContextConfig> {
    let parsed: ConfigToml = toml::from_str(content)?;

    if let Some(dir) = parsed.contexts_dir {
        config.contexts_dir = dir;
    }
    if let Some(model) = parsed.model {
        config.model = model;
    }
    if let Some(strategy) = parsed.strategy {
        config.strategy = strategy;
    }
    if let Some(threshold) = parsed.summary_threshold {
        config.summary_threshold = threshold;
    }
    if let Some(top_k) = parsed.top_k {
        config.top_k = top_k;
    }
    if let Some(var) = parsed.credentials_env {
        config.credentials_env = var;
    }

    Ok(config)
}
