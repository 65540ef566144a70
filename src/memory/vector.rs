//! Embedding and vector-search capabilities used by retrieval.
//!
//! Both are external collaborators: hosts plug in their own embedding model
//! and vector database. [`InMemoryVectorIndex`] is a brute-force cosine index
//! for tests and small deployments.

use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::turn::{Role, Turn};

/// Turns text into an embedding vector
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Nearest-neighbour lookup over memory records, scoped per conversation
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Store a record
    async fn insert(&self, record: MemoryRecord) -> Result<()>;

    /// Up to `k` records of `conversation_id` most similar to `embedding`
    async fn search(
        &self,
        conversation_id: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredRecord>>;

    /// Drop every record of a conversation, returning how many were removed
    async fn delete_conversation(&self, conversation_id: &str) -> Result<usize>;
}

/// One embedded turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub conversation_id: String,
    /// Position of the turn in the conversation's linear log
    pub sequence_index: usize,
    pub role: Role,
    pub text: String,
    pub embedding: Vec<f32>,
    pub timestamp: DateTime<Utc>,
}

impl MemoryRecord {
    /// Rebuild the turn this record was embedded from
    pub fn to_turn(&self) -> Turn {
        Turn {
            role: self.role,
            text: self.text.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// Search hit with its similarity score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: MemoryRecord,
    pub score: f32,
}

/// Sort hits by score descending, earlier turns first on ties.
/// NaN scores rank below every real score.
pub fn rank(hits: &mut [ScoredRecord]) {
    fn key(score: f32) -> f32 {
        if score.is_nan() {
            f32::NEG_INFINITY
        } else {
            score
        }
    }

    hits.sort_by(|a, b| {
        key(b.score)
            .total_cmp(&key(a.score))
            .then_with(|| a.record.sequence_index.cmp(&b.record.sequence_index))
    });
}

/// Cosine similarity; 0.0 for mismatched lengths or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Brute-force cosine index kept in memory
#[derive(Default)]
pub struct InMemoryVectorIndex {
    records: RwLock<HashMap<String, Vec<MemoryRecord>>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held for a conversation
    pub fn count(&self, conversation_id: &str) -> usize {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.get(conversation_id).map_or(0, Vec::len)
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn insert(&self, record: MemoryRecord) -> Result<()> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records
            .entry(record.conversation_id.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn search(
        &self,
        conversation_id: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let Some(bucket) = records.get(conversation_id) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<ScoredRecord> = bucket
            .iter()
            .map(|record| ScoredRecord {
                score: cosine_similarity(embedding, &record.embedding),
                record: record.clone(),
            })
            .collect();
        rank(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<usize> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        Ok(records.remove(conversation_id).map_or(0, |bucket| bucket.len()))
    }
}
