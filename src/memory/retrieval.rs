//! Retrieval-augmented context: each turn becomes an embedded memory record
//! and the model sees only the `top_k` memories closest to the prompt.
//!
//! The user prompt and the model response are stored as two separate
//! records. Sequence indexes continue from the linear log length, so they
//! stay monotonic as long as the log is append-only. Records are only
//! indexed after the turns reached the log, so a failed append never leaves
//! memories behind.

use crate::{ContextError, Result};
use std::sync::Arc;
use tracing::debug;

use super::strategy::FoldOutcome;
use super::turn::Turn;
use super::vector::{rank, Embedder, MemoryRecord, VectorIndex};

/// Default number of memories retrieved per prompt
pub const DEFAULT_TOP_K: usize = 3;

#[derive(Clone)]
pub struct RetrievalStrategy {
    top_k: usize,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl std::fmt::Debug for RetrievalStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalStrategy")
            .field("top_k", &self.top_k)
            .finish_non_exhaustive()
    }
}

fn unavailable(e: ContextError) -> ContextError {
    match e {
        ContextError::RetrievalUnavailable(_) => e,
        other => ContextError::RetrievalUnavailable(other.to_string()),
    }
}

impl RetrievalStrategy {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            embedder,
            index,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Result<Self> {
        if top_k == 0 {
            return Err(ContextError::Configuration(
                "top_k must be at least 1".to_string(),
            ));
        }
        self.top_k = top_k;
        Ok(self)
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// `[memories by similarity] ++ [prompt]`. Never falls back to full history.
    pub async fn build(&self, conversation_id: &str, prompt: &str) -> Result<Vec<Turn>> {
        let query = self.embedder.embed(prompt).await.map_err(unavailable)?;
        let mut hits = self
            .index
            .search(conversation_id, &query, self.top_k)
            .await
            .map_err(unavailable)?;

        // Backends may rank differently; enforce score order and tie-break here.
        rank(&mut hits);
        hits.truncate(self.top_k);

        debug!(
            "Retrieved {} memories for context {}",
            hits.len(),
            conversation_id
        );

        let mut contents: Vec<Turn> = hits.iter().map(|hit| hit.record.to_turn()).collect();
        contents.push(Turn::user(prompt));
        Ok(contents)
    }

    /// Embed both turns. The records are indexed by [`Self::remember`] only
    /// after the caller has appended the turns to the linear log.
    pub async fn fold(
        &self,
        conversation_id: &str,
        history: &[Turn],
        prompt: &str,
        response: &str,
    ) -> Result<FoldOutcome> {
        let turns = vec![Turn::user(prompt), Turn::model(response)];

        let mut records = Vec::with_capacity(turns.len());
        for (offset, turn) in turns.iter().enumerate() {
            let embedding = self.embedder.embed(&turn.text).await.map_err(unavailable)?;
            records.push(MemoryRecord {
                conversation_id: conversation_id.to_string(),
                sequence_index: history.len() + offset,
                role: turn.role,
                text: turn.text.clone(),
                embedding,
                timestamp: turn.timestamp,
            });
        }

        Ok(FoldOutcome::Remember { turns, records })
    }

    /// Insert records produced by [`Self::fold`]
    pub async fn remember(&self, records: Vec<MemoryRecord>) -> Result<()> {
        let count = records.len();
        for record in records {
            self.index.insert(record).await.map_err(unavailable)?;
        }
        debug!("Indexed {} memories", count);
        Ok(())
    }

    /// Remove every memory record of a conversation
    pub async fn forget(&self, conversation_id: &str) -> Result<()> {
        let removed = self
            .index
            .delete_conversation(conversation_id)
            .await
            .map_err(unavailable)?;
        debug!(
            "Removed {} memories for context {}",
            removed, conversation_id
        );
        Ok(())
    }
}
