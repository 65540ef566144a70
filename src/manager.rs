//! Context manager facade.
//!
//! One conversational turn with a host-side generation call looks like:
//!
//! ```text
//! let credential = manager.get_client();                       // rotated key
//! let contents = manager.prepare_contents(prompt, id).await?;  // what the model sees
//! let reply = host_generate(credential, manager.model(), contents)?;
//! manager.update_context(prompt, &reply, id).await?;           // fold back
//! ```
//!
//! A caller must not interleave two prepare/update cycles for the same id.

use crate::memory::{
    Collaborators, ContextStrategy, ConversationStore, FileStore, FoldOutcome, Turn,
};
use crate::rotation::{Credential, CredentialRotator};
use crate::{ContextConfig, ContextError, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Composes key rotation, conversation storage and a context strategy
pub struct ContextManager {
    rotator: Arc<CredentialRotator>,
    store: Arc<dyn ConversationStore>,
    strategy: ContextStrategy,
    model: String,
}

impl ContextManager {
    /// Create a manager over explicit parts
    pub fn new(
        rotator: Arc<CredentialRotator>,
        store: Arc<dyn ConversationStore>,
        strategy: ContextStrategy,
    ) -> Self {
        info!(
            "ContextManager initialized with {} keys and '{}' strategy",
            rotator.len(),
            strategy.kind()
        );
        Self {
            rotator,
            store,
            strategy,
            model: crate::DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Build a manager from configuration: file store under
    /// `config.contexts_dir`, keys from `config.credentials_env`.
    pub async fn from_config(config: &ContextConfig, collaborators: Collaborators) -> Result<Self> {
        let strategy = ContextStrategy::from_config(config, collaborators)?;
        let rotator = Arc::new(CredentialRotator::from_env(&config.credentials_env)?);
        let store = Arc::new(FileStore::open(&config.contexts_dir).await?);
        Ok(Self::new(rotator, store, strategy).with_model(config.model.clone()))
    }

    /// Model identifier the host should call
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn strategy(&self) -> &ContextStrategy {
        &self.strategy
    }

    /// Shared handle to the rotator, for another manager to reuse
    pub fn rotator(&self) -> Arc<CredentialRotator> {
        Arc::clone(&self.rotator)
    }

    /// Next credential in rotation
    pub fn get_client(&self) -> Credential {
        let credential = self.rotator.next();
        debug!("Providing client with API key ending in: {}", credential.masked());
        credential
    }

    /// Create an empty conversation. Leftover strategy state under the same
    /// id (from an interrupted delete) is cleared first.
    pub async fn create_context(&self, id: &str) -> Result<()> {
        if self.store.exists(id).await? {
            return Err(ContextError::AlreadyExists(id.to_string()));
        }
        self.strategy.forget(id).await?;
        self.store.create(id).await
    }

    pub async fn list_contexts(&self) -> Result<Vec<String>> {
        self.store.list().await
    }

    /// Delete strategy-owned memories, then the stored log. If forgetting
    /// fails the conversation stays listed and the delete can be retried.
    pub async fn delete_context(&self, id: &str) -> Result<()> {
        if !self.store.exists(id).await? {
            return Err(ContextError::NotFound(id.to_string()));
        }
        self.strategy.forget(id).await?;
        self.store.delete(id).await
    }

    /// Stored turns as-is
    pub async fn read_context(&self, id: &str) -> Result<Vec<Turn>> {
        self.store.read(id).await
    }

    /// Content list for the generation call, with `prompt` as the last turn
    pub async fn prepare_contents(&self, prompt: &str, id: &str) -> Result<Vec<Turn>> {
        let history = self.store.read(id).await?;
        let contents = self.strategy.build(id, &history, prompt).await?;
        debug!(
            "Prepared {} turns for context {} ({} stored)",
            contents.len(),
            id,
            history.len()
        );
        Ok(contents)
    }

    /// Fold a finished turn back into storage
    pub async fn update_context(&self, prompt: &str, response_text: &str, id: &str) -> Result<()> {
        let history = self.store.read(id).await?;
        match self.strategy.fold(id, &history, prompt, response_text).await? {
            FoldOutcome::Append(turns) => self.store.append(id, &turns).await?,
            FoldOutcome::Replace(turns) => self.store.replace(id, turns).await?,
            FoldOutcome::Remember { turns, records } => {
                self.store.append(id, &turns).await?;
                self.strategy.remember(records).await?;
            }
        }
        debug!("Context '{}' updated", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{
        Embedder, InMemoryStore, InMemoryVectorIndex, MemoryRecord, RetrievalStrategy,
        ScoredRecord, VectorIndex,
    };
    use crate::{Role, StrategyKind};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// One-hot embedding keyed on text length
    struct LengthEmbedder;

    #[async_trait]
    impl Embedder for LengthEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut v = vec![0.0; 8];
            v[text.len() % 8] = 1.0;
            Ok(v)
        }
    }

    /// In-memory index whose deletes fail while `offline` is set
    #[derive(Default)]
    struct FlakyIndex {
        inner: InMemoryVectorIndex,
        offline: AtomicBool,
    }

    #[async_trait]
    impl VectorIndex for FlakyIndex {
        async fn insert(&self, record: MemoryRecord) -> Result<()> {
            self.inner.insert(record).await
        }

        async fn search(
            &self,
            conversation_id: &str,
            embedding: &[f32],
            k: usize,
        ) -> Result<Vec<ScoredRecord>> {
            self.inner.search(conversation_id, embedding, k).await
        }

        async fn delete_conversation(&self, conversation_id: &str) -> Result<usize> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(ContextError::Capability("index unreachable".to_string()));
            }
            self.inner.delete_conversation(conversation_id).await
        }
    }

    /// In-memory store whose appends always fail
    #[derive(Default)]
    struct ReadOnlyStore {
        inner: InMemoryStore,
    }

    #[async_trait]
    impl ConversationStore for ReadOnlyStore {
        async fn create(&self, id: &str) -> Result<()> {
            self.inner.create(id).await
        }

        async fn append(&self, _id: &str, _turns: &[Turn]) -> Result<()> {
            Err(ContextError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only file system",
            )))
        }

        async fn read(&self, id: &str) -> Result<Vec<Turn>> {
            self.inner.read(id).await
        }

        async fn replace(&self, id: &str, turns: Vec<Turn>) -> Result<()> {
            self.inner.replace(id, turns).await
        }

        async fn list(&self) -> Result<Vec<String>> {
            self.inner.list().await
        }

        async fn delete(&self, id: &str) -> Result<()> {
            self.inner.delete(id).await
        }

        async fn exists(&self, id: &str) -> Result<bool> {
            self.inner.exists(id).await
        }
    }

    fn retrieval_manager(
        store: Arc<dyn ConversationStore>,
        index: Arc<dyn VectorIndex>,
    ) -> ContextManager {
        let rotator = Arc::new(CredentialRotator::from_list("k1").unwrap());
        let strategy = ContextStrategy::Retrieval(RetrievalStrategy::new(
            Arc::new(LengthEmbedder),
            index,
        ));
        ContextManager::new(rotator, store, strategy)
    }

    fn manager() -> ContextManager {
        let rotator = Arc::new(CredentialRotator::from_list("k1,k2").unwrap());
        ContextManager::new(
            rotator,
            Arc::new(InMemoryStore::new()),
            ContextStrategy::default(),
        )
    }

    #[tokio::test]
    async fn test_unknown_context_is_not_found() {
        let manager = manager();
        assert!(matches!(
            manager.prepare_contents("A prompt", "i_do_not_exist").await,
            Err(ContextError::NotFound(_))
        ));
        assert!(matches!(
            manager.update_context("p", "r", "i_do_not_exist").await,
            Err(ContextError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_prompt_round_trip() {
        let manager = manager();
        manager.create_context("bad_inputs").await.unwrap();

        let contents = manager.prepare_contents("", "bad_inputs").await.unwrap();
        assert_eq!(contents.last().unwrap().text, "");
        manager
            .update_context("", "You didn't say anything.", "bad_inputs")
            .await
            .unwrap();

        let stored = manager.read_context("bad_inputs").await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].role, Role::Model);
    }

    #[test]
    fn test_get_client_rotates() {
        let manager = manager();
        let keys: Vec<String> = (0..4)
            .map(|_| manager.get_client().as_str().to_string())
            .collect();
        assert_eq!(keys, vec!["k1", "k2", "k1", "k2"]);
    }

    #[test]
    fn test_shared_rotator() {
        let first = manager();
        let second = ContextManager::new(
            first.rotator(),
            Arc::new(InMemoryStore::new()),
            ContextStrategy::default(),
        );
        assert_eq!(first.get_client().as_str(), "k1");
        assert_eq!(second.get_client().as_str(), "k2");
    }

    #[tokio::test]
    async fn test_failed_forget_keeps_conversation() {
        let index = Arc::new(FlakyIndex::default());
        let manager = retrieval_manager(Arc::new(InMemoryStore::new()), index.clone());
        assert_eq!(manager.strategy().kind(), StrategyKind::Retrieval);

        manager.create_context("keep").await.unwrap();
        manager.update_context("alpha", "beta", "keep").await.unwrap();
        assert_eq!(index.inner.count("keep"), 2);

        index.offline.store(true, Ordering::SeqCst);
        assert!(matches!(
            manager.delete_context("keep").await,
            Err(ContextError::RetrievalUnavailable(_))
        ));
        assert_eq!(manager.list_contexts().await.unwrap(), vec!["keep"]);
        assert_eq!(index.inner.count("keep"), 2);

        // Retry once the index is back
        index.offline.store(false, Ordering::SeqCst);
        manager.delete_context("keep").await.unwrap();
        assert!(manager.list_contexts().await.unwrap().is_empty());
        assert_eq!(index.inner.count("keep"), 0);
    }

    #[tokio::test]
    async fn test_delete_unknown_context_is_not_found() {
        let index = Arc::new(FlakyIndex::default());
        let manager = retrieval_manager(Arc::new(InMemoryStore::new()), index);
        assert!(matches!(
            manager.delete_context("ghost").await,
            Err(ContextError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_clears_orphaned_memories() {
        let index = Arc::new(FlakyIndex::default());
        index
            .insert(MemoryRecord {
                conversation_id: "reused".to_string(),
                sequence_index: 0,
                role: Role::User,
                text: "stale".to_string(),
                embedding: vec![1.0; 8],
                timestamp: chrono::Utc::now(),
            })
            .await
            .unwrap();
        let manager = retrieval_manager(Arc::new(InMemoryStore::new()), index.clone());

        manager.create_context("reused").await.unwrap();
        assert_eq!(index.inner.count("reused"), 0);
        let contents = manager.prepare_contents("stale", "reused").await.unwrap();
        assert_eq!(contents.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_append_indexes_nothing() {
        let index = Arc::new(FlakyIndex::default());
        let manager = retrieval_manager(Arc::new(ReadOnlyStore::default()), index.clone());
        manager.create_context("ro").await.unwrap();

        for _ in 0..2 {
            assert!(matches!(
                manager.update_context("p", "r", "ro").await,
                Err(ContextError::Io(_))
            ));
        }
        assert_eq!(index.inner.count("ro"), 0);
        assert!(manager.read_context("ro").await.unwrap().is_empty());
    }
}
