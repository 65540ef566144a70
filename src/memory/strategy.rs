//! Context strategies: what the model sees each turn, and how a finished
//! turn is written back.

use crate::config::StrategyKind;
use crate::{ContextConfig, ContextError, Result};
use std::sync::Arc;

use super::compact::{RollingSummaryStrategy, Summarizer};
use super::retrieval::RetrievalStrategy;
use super::turn::Turn;
use super::vector::{Embedder, MemoryRecord, VectorIndex};

/// How the stored conversation changes after a turn
#[derive(Debug, Clone, PartialEq)]
pub enum FoldOutcome {
    /// Add these turns after the existing ones
    Append(Vec<Turn>),
    /// Swap the stored turns for these (compaction)
    Replace(Vec<Turn>),
    /// Append `turns`, then hand `records` to [`ContextStrategy::remember`].
    /// Nothing is indexed until the log write has succeeded.
    Remember {
        turns: Vec<Turn>,
        records: Vec<MemoryRecord>,
    },
}

/// Full history, untouched. Token overflow is the generation call's problem.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleStrategy;

impl SimpleStrategy {
    pub fn build(&self, history: &[Turn], prompt: &str) -> Vec<Turn> {
        let mut contents = history.to_vec();
        contents.push(Turn::user(prompt));
        contents
    }

    pub fn fold(&self, prompt: &str, response: &str) -> FoldOutcome {
        FoldOutcome::Append(vec![Turn::user(prompt), Turn::model(response)])
    }
}

/// External capabilities a strategy may need
#[derive(Clone, Default)]
pub struct Collaborators {
    pub summarizer: Option<Arc<dyn Summarizer>>,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub index: Option<Arc<dyn VectorIndex>>,
}

impl Collaborators {
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }
}

/// The strategy a manager runs, chosen once at construction
#[derive(Debug, Clone)]
pub enum ContextStrategy {
    Simple(SimpleStrategy),
    RollingSummary(RollingSummaryStrategy),
    Retrieval(RetrievalStrategy),
}

impl Default for ContextStrategy {
    fn default() -> Self {
        Self::Simple(SimpleStrategy)
    }
}

impl ContextStrategy {
    /// Build the configured variant, wiring in the capabilities it needs.
    pub fn from_config(config: &ContextConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        match config.strategy {
            StrategyKind::Simple => Ok(Self::Simple(SimpleStrategy)),
            StrategyKind::RollingSummary => {
                let summarizer = collaborators.summarizer.ok_or_else(|| {
                    ContextError::Configuration(
                        "rolling_summary strategy needs a summarizer".to_string(),
                    )
                })?;
                Ok(Self::RollingSummary(
                    RollingSummaryStrategy::new(summarizer)
                        .with_summary_threshold(config.summary_threshold)?,
                ))
            }
            StrategyKind::Retrieval => {
                let (Some(embedder), Some(index)) = (collaborators.embedder, collaborators.index)
                else {
                    return Err(ContextError::Configuration(
                        "retrieval strategy needs an embedder and a vector index".to_string(),
                    ));
                };
                Ok(Self::Retrieval(
                    RetrievalStrategy::new(embedder, index).with_top_k(config.top_k)?,
                ))
            }
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Simple(_) => StrategyKind::Simple,
            Self::RollingSummary(_) => StrategyKind::RollingSummary,
            Self::Retrieval(_) => StrategyKind::Retrieval,
        }
    }

    /// Exact content list for the generation call, prompt last.
    pub async fn build(
        &self,
        conversation_id: &str,
        history: &[Turn],
        prompt: &str,
    ) -> Result<Vec<Turn>> {
        match self {
            Self::Simple(s) => Ok(s.build(history, prompt)),
            Self::RollingSummary(s) => Ok(s.build(history, prompt)),
            Self::Retrieval(s) => s.build(conversation_id, prompt).await,
        }
    }

    /// How the stored conversation changes once `response` came back.
    pub async fn fold(
        &self,
        conversation_id: &str,
        history: &[Turn],
        prompt: &str,
        response: &str,
    ) -> Result<FoldOutcome> {
        match self {
            Self::Simple(s) => Ok(s.fold(prompt, response)),
            Self::RollingSummary(s) => Ok(s.fold(conversation_id, history, prompt, response).await),
            Self::Retrieval(s) => s.fold(conversation_id, history, prompt, response).await,
        }
    }

    /// Index records from a [`FoldOutcome::Remember`] once the turns are stored.
    pub async fn remember(&self, records: Vec<MemoryRecord>) -> Result<()> {
        match self {
            Self::Retrieval(s) => s.remember(records).await,
            Self::Simple(_) | Self::RollingSummary(_) => Ok(()),
        }
    }

    /// Drop strategy-owned state for a deleted conversation.
    pub async fn forget(&self, conversation_id: &str) -> Result<()> {
        match self {
            Self::Retrieval(s) => s.forget(conversation_id).await,
            Self::Simple(_) | Self::RollingSummary(_) => Ok(()),
        }
    }
}
