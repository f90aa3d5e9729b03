//! Editing-session lifecycle driven by editor callbacks.
//!
//! | status | action |
//! |---|---|
//! | 0 | key unknown to the editor: unlock |
//! | 1 | session active: lock unless already locked |
//! | 2 | content ready: unlock, then fetch and save |
//! | 3 | editor failed to save: unlock |
//! | 4 | closed without changes: unlock |
//!
//! Any other status is rejected before the store is touched.

use crate::document::{ChangeToken, Version};
use crate::error::{Error, Result};
use crate::fetch::ContentFetcher;
use crate::key::change_token_from_key;
use crate::resolver::{resolve, CallbackTarget, Resolved};
use crate::store::{ContentUpdate, DocumentStore, SaveOptions};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const DEFAULT_LOCK_OWNER: &str = "editor";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CallbackEnvelope {
    pub status: i64,
    pub key: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub token: Option<String>,
}

impl CallbackEnvelope {
    /// Parse a trusted payload.
    pub fn from_payload(payload: Value) -> Result<Self> {
        serde_json::from_value(payload).map_err(|e| Error::MalformedPayload(e.to_string()))
    }

    /// Apply the selector carried by the callback URL, which takes precedence.
    pub fn with_url_selector(mut self, digest: Option<String>, index: Option<usize>) -> Self {
        if digest.is_some() {
            self.digest = digest;
        }
        if index.is_some() {
            self.index = index;
        }
        self
    }

    pub fn target(&self) -> CallbackTarget {
        CallbackTarget::from_parts(self.digest.as_deref(), self.index)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackStatus {
    KeyNotFound,
    Editing,
    MustSave,
    SaveFailed,
    ClosedWithoutChanges,
}

impl TryFrom<i64> for CallbackStatus {
    type Error = Error;

    fn try_from(code: i64) -> Result<Self> {
        match code {
            0 => Ok(CallbackStatus::KeyNotFound),
            1 => Ok(CallbackStatus::Editing),
            2 => Ok(CallbackStatus::MustSave),
            3 => Ok(CallbackStatus::SaveFailed),
            4 => Ok(CallbackStatus::ClosedWithoutChanges),
            other => Err(Error::UnknownStatus(other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackOutcome {
    Unlocked { was_locked: bool },
    Locked,
    AlreadyLocked,
    Saved {
        change_token: ChangeToken,
        version: Option<Version>,
    },
    /// The referenced content is gone; the callback was dropped.
    Skipped,
}

/// Response body expected by the editor service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackAck {
    pub error: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CallbackAck {
    pub fn ok() -> Self {
        Self {
            error: 0,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: 1,
            message: Some(message.into()),
        }
    }
}

pub struct CallbackProcessor {
    store: Arc<dyn DocumentStore>,
    fetcher: Arc<dyn ContentFetcher>,
}

impl CallbackProcessor {
    pub fn new(store: Arc<dyn DocumentStore>, fetcher: Arc<dyn ContentFetcher>) -> Self {
        Self { store, fetcher }
    }

    pub async fn process(&self, doc_id: &str, envelope: CallbackEnvelope) -> Result<CallbackOutcome> {
        let status = CallbackStatus::try_from(envelope.status)?;
        match status {
            CallbackStatus::KeyNotFound => {
                error!(doc = doc_id, key = %envelope.key, "editor reported that no document with this key can be found");
                self.unlock(doc_id).await
            }
            CallbackStatus::Editing => {
                let owner = envelope
                    .users
                    .first()
                    .map(String::as_str)
                    .unwrap_or(DEFAULT_LOCK_OWNER);
                if self.store.lock_if_unlocked(doc_id, owner).await? {
                    info!(doc = doc_id, owner, "document open for editing, locking document");
                    Ok(CallbackOutcome::Locked)
                } else {
                    debug!(doc = doc_id, "document already locked, another user has entered or left");
                    Ok(CallbackOutcome::AlreadyLocked)
                }
            }
            CallbackStatus::MustSave => {
                info!(doc = doc_id, "document updated, changing content");
                self.store.unlock(doc_id).await?;
                self.commit(doc_id, &envelope).await
            }
            CallbackStatus::SaveFailed => {
                error!(doc = doc_id, "editor reported that saving the document has failed");
                self.unlock(doc_id).await
            }
            CallbackStatus::ClosedWithoutChanges => {
                info!(doc = doc_id, "no document updates, unlocking document");
                self.unlock(doc_id).await
            }
        }
    }

    async fn unlock(&self, doc_id: &str) -> Result<CallbackOutcome> {
        let was_locked = self.store.unlock(doc_id).await?;
        Ok(CallbackOutcome::Unlocked { was_locked })
    }

    async fn commit(&self, doc_id: &str, envelope: &CallbackEnvelope) -> Result<CallbackOutcome> {
        let url = envelope.url.as_deref().ok_or(Error::MissingUrl)?;
        let expected = change_token_from_key(&envelope.key)?;
        let document = self.store.get(doc_id).await?;

        let target = envelope.target();
        let Some(resolved) = resolve(&document, &target) else {
            warn!(doc = doc_id, ?target, "callback refers to content that no longer exists, ignoring");
            return Ok(CallbackOutcome::Skipped);
        };

        let data = self.fetcher.fetch(url).await?;
        let replacement = resolved.blob().with_data(data);
        let update = match resolved {
            Resolved::Primary(_) => ContentUpdate::Primary(replacement),
            Resolved::Attachment { position, .. } => {
                let mut attachments = document.attachments.clone();
                attachments[position] = replacement;
                ContentUpdate::Attachments(attachments)
            }
        };

        let options = SaveOptions {
            expected_change_token: expected,
            bump_minor: document.is_versionable(),
        };
        let receipt = self.store.save(doc_id, update, options).await?;
        info!(doc = doc_id, change_token = %receipt.change_token, "document saved");
        Ok(CallbackOutcome::Saved {
            change_token: receipt.change_token,
            version: receipt.version,
        })
    }
}
