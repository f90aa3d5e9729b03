//! Repository documents as seen by the editing bridge.
//!
//! A document carries either a primary content blob, a list of attachments,
//! or both. Attachments are addressed by position, but a position is only
//! meaningful for one snapshot of the list; the blob digest is the durable
//! identifier.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use ring::digest::{digest, SHA256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Opaque optimistic-concurrency marker. Changes on every content save.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeToken(String);

impl ChangeToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ChangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    pub fn bump_minor(self) -> Self {
        Self {
            major: self.major,
            minor: self.minor + 1,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum LockState {
    #[default]
    Unlocked,
    Locked {
        owner: String,
        since: DateTime<Utc>,
    },
}

impl LockState {
    pub fn is_locked(&self) -> bool {
        matches!(self, LockState::Locked { .. })
    }
}

/// A stored file. The digest always matches `data`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    filename: String,
    mime_type: String,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(with = "base64_bytes")]
    data: Bytes,
    digest: String,
}

impl Blob {
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            encoding: None,
            digest: digest_hex(&data),
            data,
        }
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    /// New bytes in this slot: filename, mime type and encoding are kept.
    pub fn with_data(&self, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            filename: self.filename.clone(),
            mime_type: self.mime_type.clone(),
            encoding: self.encoding.clone(),
            digest: digest_hex(&data),
            data,
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Lower-cased text after the last dot of the filename, empty if none.
    pub fn extension(&self) -> String {
        file_extension(&self.filename)
    }
}

pub fn file_extension(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => String::new(),
    }
}

/// Lowercase hex SHA-256.
pub fn digest_hex(data: &[u8]) -> String {
    digest(&SHA256, data)
        .as_ref()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: Option<Blob>,
    #[serde(default)]
    pub attachments: Vec<Blob>,
    #[serde(default)]
    pub lock: LockState,
    pub change_token: ChangeToken,
    /// `None` when the document is not versionable.
    #[serde(default)]
    pub versioning: Option<Version>,
}

impl Document {
    pub fn attachment(&self, index: usize) -> Option<&Blob> {
        self.attachments.get(index)
    }

    pub fn is_versionable(&self) -> bool {
        self.versioning.is_some()
    }
}

mod base64_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(data: &Bytes, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&BASE64.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Bytes, D::Error> {
        let text = String::deserialize(d)?;
        BASE64
            .decode(text.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
