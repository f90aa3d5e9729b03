//! Locates the blob a callback refers to.
//!
//! The digest is authoritative. An index is only a hint for callbacks that
//! carry no digest: positions shift when the attachment list changes, so an
//! index-addressed callback may land on a different file than the one that
//! was opened.

use crate::document::{Blob, Document};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackTarget {
    Primary,
    Digest(String),
    Index(usize),
}

impl CallbackTarget {
    /// A non-empty digest wins over an index; neither means the primary content.
    pub fn from_parts(digest: Option<&str>, index: Option<usize>) -> Self {
        match (digest.filter(|d| !d.is_empty()), index) {
            (Some(digest), _) => CallbackTarget::Digest(digest.to_string()),
            (None, Some(index)) => CallbackTarget::Index(index),
            (None, None) => CallbackTarget::Primary,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolved<'a> {
    Primary(&'a Blob),
    Attachment { position: usize, blob: &'a Blob },
}

impl<'a> Resolved<'a> {
    pub fn blob(&self) -> &'a Blob {
        match *self {
            Resolved::Primary(blob) => blob,
            Resolved::Attachment { blob, .. } => blob,
        }
    }
}

/// `None` means the referenced content no longer exists in this snapshot.
pub fn resolve<'a>(document: &'a Document, target: &CallbackTarget) -> Option<Resolved<'a>> {
    match target {
        CallbackTarget::Primary => document.content.as_ref().map(Resolved::Primary),
        CallbackTarget::Digest(digest) => document
            .attachments
            .iter()
            .enumerate()
            .find(|(_, blob)| blob.digest() == digest)
            .map(|(position, blob)| Resolved::Attachment { position, blob }),
        CallbackTarget::Index(index) => document
            .attachment(*index)
            .map(|blob| Resolved::Attachment {
                position: *index,
                blob,
            }),
    }
}
