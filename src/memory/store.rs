//! Conversation storage.
//!
//! A conversation is an ordered turn log keyed by its id. [`FileStore`] keeps
//! one JSON document per conversation so the data survives restarts;
//! [`InMemoryStore`] has the same contract without touching disk.
//!
//! Directory layout for `FileStore`:
//!   {contexts_dir}/{id}.json
//!   {contexts_dir}/.{id}.json.*.tmp   (in-flight writes)

use crate::{ContextError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::turn::Turn;

/// Durable mapping from conversation id to its ordered turns
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create an empty conversation. Fails if the id is taken.
    async fn create(&self, id: &str) -> Result<()>;

    /// Append turns in order, all or nothing.
    async fn append(&self, id: &str, turns: &[Turn]) -> Result<()>;

    /// Read the full ordered turn log.
    async fn read(&self, id: &str) -> Result<Vec<Turn>>;

    /// Overwrite the stored turns (compaction only).
    async fn replace(&self, id: &str, turns: Vec<Turn>) -> Result<()>;

    /// All conversation ids, sorted ascending.
    async fn list(&self) -> Result<Vec<String>>;

    /// Remove a conversation and everything stored for it.
    async fn delete(&self, id: &str) -> Result<()>;

    async fn exists(&self, id: &str) -> Result<bool>;
}

/// Check that an id is usable as a file name on every platform.
pub fn validate_context_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ContextError::InvalidContextId(id.to_string()))
    }
}

/// On-disk document for one conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationFile {
    pub id: String,
    pub updated_at: DateTime<Utc>,
    pub turns: Vec<Turn>,
}

/// JSON-file-per-conversation store.
pub struct FileStore {
    contexts_dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `contexts_dir`. Creates the directory if needed.
    pub async fn open(contexts_dir: &Path) -> Result<Self> {
        fs::create_dir_all(contexts_dir).await?;
        Ok(Self {
            contexts_dir: contexts_dir.to_path_buf(),
        })
    }

    fn context_path(&self, id: &str) -> PathBuf {
        self.contexts_dir.join(format!("{}.json", id))
    }

    /// Unique per write, so concurrent writers never share a temp file
    fn temp_path(&self, id: &str) -> PathBuf {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        let n = NEXT.fetch_add(1, Ordering::Relaxed);
        self.contexts_dir
            .join(format!(".{}.json.{}-{}.tmp", id, std::process::id(), n))
    }

    async fn load(&self, id: &str) -> Result<ConversationFile> {
        validate_context_id(id)?;
        let content = match fs::read_to_string(self.context_path(id)).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ContextError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    /// Serialize a document into a fresh, synced temp file and return its path.
    async fn write_temp(&self, document: &ConversationFile) -> Result<PathBuf> {
        let content = serde_json::to_string_pretty(document)?;
        let temp = self.temp_path(&document.id);
        let written = async {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp)
                .await?;
            file.write_all(content.as_bytes()).await?;
            file.sync_all().await
        }
        .await;
        if let Err(e) = written {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(temp)
    }

    /// Write to a sibling temp file, then rename over the target.
    async fn save(&self, id: &str, turns: Vec<Turn>) -> Result<()> {
        let document = ConversationFile {
            id: id.to_string(),
            updated_at: Utc::now(),
            turns,
        };
        let temp = self.write_temp(&document).await?;
        if let Err(e) = fs::rename(&temp, self.context_path(id)).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }

        debug!("Saved context {} ({} turns)", id, document.turns.len());
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for FileStore {
    async fn create(&self, id: &str) -> Result<()> {
        validate_context_id(id)?;
        let document = ConversationFile {
            id: id.to_string(),
            updated_at: Utc::now(),
            turns: Vec::new(),
        };
        let temp = self.write_temp(&document).await?;

        // hard_link refuses to replace an existing target, so the document
        // appears complete or not at all and a live conversation is never clobbered
        let linked = fs::hard_link(&temp, self.context_path(id)).await;
        let _ = fs::remove_file(&temp).await;
        match linked {
            Ok(()) => {
                info!("Created context {}", id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(ContextError::AlreadyExists(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn append(&self, id: &str, turns: &[Turn]) -> Result<()> {
        let mut document = self.load(id).await?;
        document.turns.extend_from_slice(turns);
        self.save(id, document.turns).await
    }

    async fn read(&self, id: &str) -> Result<Vec<Turn>> {
        Ok(self.load(id).await?.turns)
    }

    async fn replace(&self, id: &str, turns: Vec<Turn>) -> Result<()> {
        // Existence check only; the old turns are discarded
        self.load(id).await?;
        self.save(id, turns).await
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.contexts_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(id) = name.strip_suffix(".json") {
                    if validate_context_id(id).is_ok() {
                        ids.push(id.to_string());
                    } else {
                        warn!("Ignoring unexpected file in contexts dir: {}", name);
                    }
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        validate_context_id(id)?;
        match fs::remove_file(self.context_path(id)).await {
            Ok(()) => {
                info!("Deleted context {}", id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ContextError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        validate_context_id(id)?;
        Ok(fs::try_exists(self.context_path(id)).await?)
    }
}

/// Process-lifetime store for tests and hosts without durability needs.
#[derive(Default)]
pub struct InMemoryStore {
    conversations: RwLock<BTreeMap<String, Vec<Turn>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn create(&self, id: &str) -> Result<()> {
        validate_context_id(id)?;
        let mut conversations = self
            .conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if conversations.contains_key(id) {
            return Err(ContextError::AlreadyExists(id.to_string()));
        }
        conversations.insert(id.to_string(), Vec::new());
        Ok(())
    }

    async fn append(&self, id: &str, turns: &[Turn]) -> Result<()> {
        let mut conversations = self
            .conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let stored = conversations
            .get_mut(id)
            .ok_or_else(|| ContextError::NotFound(id.to_string()))?;
        stored.extend_from_slice(turns);
        Ok(())
    }

    async fn read(&self, id: &str) -> Result<Vec<Turn>> {
        let conversations = self
            .conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        conversations
            .get(id)
            .cloned()
            .ok_or_else(|| ContextError::NotFound(id.to_string()))
    }

    async fn replace(&self, id: &str, turns: Vec<Turn>) -> Result<()> {
        let mut conversations = self
            .conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let stored = conversations
            .get_mut(id)
            .ok_or_else(|| ContextError::NotFound(id.to_string()))?;
        *stored = turns;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let conversations = self
            .conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(conversations.keys().cloned().collect())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut conversations = self
            .conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        conversations
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ContextError::NotFound(id.to_string()))
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        let conversations = self
            .conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(conversations.contains_key(id))
    }
}
