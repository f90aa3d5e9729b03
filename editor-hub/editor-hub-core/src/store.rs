//! Document store collaborator.
//!
//! The bridge only needs a handful of primitives from the repository: read a
//! document, atomically take or release its lock, and save new content
//! conditioned on an expected change token. `MemoryDocumentStore` provides
//! them in-process and can persist each document as `<id>.json` in a data
//! directory.

use crate::document::{Blob, ChangeToken, Document, LockState, Version};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Replacement content for one save.
#[derive(Clone, Debug)]
pub enum ContentUpdate {
    Primary(Blob),
    Attachments(Vec<Blob>),
}

#[derive(Clone, Debug, Default)]
pub struct SaveOptions {
    /// Save is rejected with [`Error::Conflict`] unless the stored token matches.
    pub expected_change_token: Option<ChangeToken>,
    /// Request a minor version increment; ignored for non-versionable documents.
    pub bump_minor: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveReceipt {
    pub change_token: ChangeToken,
    pub version: Option<Version>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Document>;

    /// Take the lock if nobody holds it. Returns `true` when this call acquired it.
    async fn lock_if_unlocked(&self, id: &str, owner: &str) -> Result<bool>;

    /// Release the lock. Returns `true` when the document was locked.
    async fn unlock(&self, id: &str) -> Result<bool>;

    async fn save(&self, id: &str, update: ContentUpdate, options: SaveOptions) -> Result<SaveReceipt>;
}

/// Input for [`MemoryDocumentStore::create`].
#[derive(Clone, Debug, Default)]
pub struct NewDocument {
    pub title: String,
    pub content: Option<Blob>,
    pub attachments: Vec<Blob>,
    pub versionable: bool,
}

pub struct MemoryDocumentStore {
    docs: RwLock<HashMap<String, Document>>,
    data_dir: Option<PathBuf>,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            data_dir: None,
        }
    }

    /// Open a file-backed store, loading every `*.json` document in `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let mut docs = HashMap::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let data = std::fs::read(&path)?;
            let doc: Document = serde_json::from_slice(&data)
                .map_err(|e| Error::Store(format!("{}: {e}", path.display())))?;
            docs.insert(doc.id.clone(), doc);
        }
        debug!(count = docs.len(), dir = %dir.display(), "loaded documents");
        Ok(Self {
            docs: RwLock::new(docs),
            data_dir: Some(dir.to_path_buf()),
        })
    }

    pub async fn create(&self, new: NewDocument) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let doc = Document {
            id: id.clone(),
            title: new.title,
            content: new.content,
            attachments: new.attachments,
            lock: LockState::Unlocked,
            change_token: ChangeToken::new("1"),
            versioning: new.versionable.then(|| Version { major: 0, minor: 1 }),
        };
        self.insert(doc).await?;
        Ok(id)
    }

    /// Insert or replace a document as-is.
    pub async fn insert(&self, doc: Document) -> Result<()> {
        self.persist(&doc)?;
        self.docs.write().await.insert(doc.id.clone(), doc);
        Ok(())
    }

    fn persist(&self, doc: &Document) -> Result<()> {
        let Some(dir) = &self.data_dir else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(doc).map_err(|e| Error::Store(e.to_string()))?;
        let path = dir.join(format!("{}.json", doc.id));
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

fn next_change_token(current: &ChangeToken) -> ChangeToken {
    let n = current.as_str().parse::<u64>().unwrap_or(0);
    ChangeToken::new((n + 1).to_string())
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, id: &str) -> Result<Document> {
        self.docs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::DocumentNotFound(id.to_string()))
    }

    async fn lock_if_unlocked(&self, id: &str, owner: &str) -> Result<bool> {
        let mut docs = self.docs.write().await;
        let doc = docs
            .get_mut(id)
            .ok_or_else(|| Error::DocumentNotFound(id.to_string()))?;
        if doc.lock.is_locked() {
            return Ok(false);
        }
        let mut locked = doc.clone();
        locked.lock = LockState::Locked {
            owner: owner.to_string(),
            since: Utc::now(),
        };
        self.persist(&locked)?;
        *doc = locked;
        Ok(true)
    }

    async fn unlock(&self, id: &str) -> Result<bool> {
        let mut docs = self.docs.write().await;
        let doc = docs
            .get_mut(id)
            .ok_or_else(|| Error::DocumentNotFound(id.to_string()))?;
        if !doc.lock.is_locked() {
            return Ok(false);
        }
        let mut unlocked = doc.clone();
        unlocked.lock = LockState::Unlocked;
        self.persist(&unlocked)?;
        *doc = unlocked;
        Ok(true)
    }

    async fn save(&self, id: &str, update: ContentUpdate, options: SaveOptions) -> Result<SaveReceipt> {
        let mut docs = self.docs.write().await;
        let current = docs
            .get(id)
            .ok_or_else(|| Error::DocumentNotFound(id.to_string()))?;
        if let Some(expected) = &options.expected_change_token {
            if *expected != current.change_token {
                return Err(Error::Conflict);
            }
        }

        let mut doc = current.clone();
        match update {
            ContentUpdate::Primary(blob) => doc.content = Some(blob),
            ContentUpdate::Attachments(list) => doc.attachments = list,
        }
        doc.change_token = next_change_token(&doc.change_token);
        if options.bump_minor {
            doc.versioning = doc.versioning.map(Version::bump_minor);
        }

        // disk first so a failed write leaves memory untouched
        self.persist(&doc)?;
        let receipt = SaveReceipt {
            change_token: doc.change_token.clone(),
            version: doc.versioning,
        };
        docs.insert(doc.id.clone(), doc);
        Ok(receipt)
    }
}
