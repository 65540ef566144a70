//! Context Keeper - conversation context for stateless LLM APIs
//!
//! A library a host application calls around each model turn to:
//! - Rotate API keys round-robin across calls
//! - Persist conversations as ordered turn logs
//! - Decide what history the model sees (full, rolling summary, or retrieved memories)

pub mod config;
pub mod manager;
pub mod memory;
pub mod rotation;

pub use config::StrategyKind;
pub use manager::ContextManager;
pub use memory::{
    Collaborators, ContextStrategy, ConversationStore, FileStore, FoldOutcome, InMemoryStore,
    Role, Turn,
};
pub use rotation::{Credential, CredentialRotator};

use std::path::PathBuf;

/// Default model the host is expected to call
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Default environment variable holding comma-separated API keys
pub const DEFAULT_CREDENTIALS_ENV: &str = "GEMINI_API_KEYS";

/// Configuration for Context Keeper
#[derive(Debug, Clone, PartialEq)]
pub struct ContextConfig {
    /// Directory holding one JSON file per conversation
    pub contexts_dir: PathBuf,

    /// Model identifier handed back to the host for its generation call
    pub model: String,

    /// Which context strategy to run
    pub strategy: StrategyKind,

    /// Turn count that triggers rolling-summary compaction
    pub summary_threshold: usize,

    /// Number of memories retrieved per prompt
    pub top_k: usize,

    /// Environment variable the credentials are read from
    pub credentials_env: String,
}

impl ContextConfig {
    pub fn new(home: PathBuf) -> Self {
        Self {
            contexts_dir: home.join("contexts"),
            model: DEFAULT_MODEL.to_string(),
            strategy: StrategyKind::Simple,
            summary_threshold: memory::DEFAULT_SUMMARY_THRESHOLD,
            top_k: memory::DEFAULT_TOP_K,
            credentials_env: DEFAULT_CREDENTIALS_ENV.to_string(),
        }
    }

    pub fn with_contexts_dir(mut self, path: PathBuf) -> Self {
        self.contexts_dir = path;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_summary_threshold(mut self, threshold: usize) -> Self {
        self.summary_threshold = threshold;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_credentials_env(mut self, var: impl Into<String>) -> Self {
        self.credentials_env = var.into();
        self
    }

    /// Reject parameter values no strategy can run with
    pub fn validate(&self) -> Result<()> {
        if self.summary_threshold == 0 {
            return Err(ContextError::Configuration(
                "summary_threshold must be at least 1".to_string(),
            ));
        }
        if self.top_k == 0 {
            return Err(ContextError::Configuration(
                "top_k must be at least 1".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(ContextError::Configuration(
                "model must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result type for Context Keeper operations
pub type Result<T> = std::result::Result<T, ContextError>;

/// Errors that can occur in Context Keeper
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Context '{0}' already exists")]
    AlreadyExists(String),

    #[error("Context '{0}' not found. Create it first with `create_context`")]
    NotFound(String),

    #[error("Retrieval backend unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("Invalid context id '{0}': use ASCII letters, digits, '-' or '_'")]
    InvalidContextId(String),

    #[error("External capability failed: {0}")]
    Capability(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}
