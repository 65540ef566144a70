//! Memory module for Context Keeper
//!
//! Provides turn storage, the context strategies, and the capability
//! interfaces (summarizer, embedder, vector index) those strategies call out to.

mod compact;
mod retrieval;
mod store;
mod strategy;
mod turn;
mod vector;

pub use compact::{
    summarization_request, RollingSummaryStrategy, Summarizer, DEFAULT_SUMMARY_THRESHOLD,
    SUMMARIZATION_PROMPT,
};
pub use retrieval::{RetrievalStrategy, DEFAULT_TOP_K};
pub use store::{validate_context_id, ConversationFile, ConversationStore, FileStore, InMemoryStore};
pub use strategy::{Collaborators, ContextStrategy, FoldOutcome, SimpleStrategy};
pub use turn::{render_transcript, Role, Turn, SUMMARY_PREFIX};
pub use vector::{
    cosine_similarity, Embedder, InMemoryVectorIndex, MemoryRecord, ScoredRecord, VectorIndex,
};
