//! Document keys identify "this document, this slot, this content" to the
//! editor service's session cache.
//!
//! A key has two dot-separated parts. The content part hashes the document
//! id, the slot and the slot's digest. The change part carries the
//! document's change token so a callback can hand it back for the
//! optimistic-concurrency check on save.

use crate::document::{digest_hex, ChangeToken, Document};
use crate::error::{Error, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

const NO_TOKEN: &str = "none";
const TOKEN_PREFIX: char = 't';
const CONTENT_HASH_LEN: usize = 32;

pub fn make_key(document: &Document, selector: Option<usize>) -> String {
    let (label, blob) = match selector {
        None => ("main".to_string(), document.content.as_ref()),
        Some(index) => (format!("att:{index}"), document.attachment(index)),
    };

    let content = match blob {
        Some(blob) => {
            let mut input = Vec::new();
            input.extend_from_slice(document.id.as_bytes());
            input.push(0);
            input.extend_from_slice(label.as_bytes());
            input.push(0);
            input.extend_from_slice(blob.digest().as_bytes());
            let mut hash = digest_hex(&input);
            hash.truncate(CONTENT_HASH_LEN);
            hash
        }
        None => sanitize(&document.id),
    };

    let change = if document.change_token.is_empty() {
        NO_TOKEN.to_string()
    } else {
        format!(
            "{TOKEN_PREFIX}{}",
            URL_SAFE_NO_PAD.encode(document.change_token.as_str())
        )
    };

    format!("{content}.{change}")
}

/// Recover the change token a key was minted with.
pub fn change_token_from_key(key: &str) -> Result<Option<ChangeToken>> {
    let (_, change) = key
        .rsplit_once('.')
        .ok_or_else(|| Error::MalformedPayload(format!("key {key:?} has no change part")))?;
    if change == NO_TOKEN {
        return Ok(None);
    }
    let encoded = change
        .strip_prefix(TOKEN_PREFIX)
        .ok_or_else(|| Error::MalformedPayload(format!("key {key:?} has no change part")))?;
    let raw = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| Error::MalformedPayload(format!("key {key:?}: {e}")))?;
    let token = String::from_utf8(raw)
        .map_err(|e| Error::MalformedPayload(format!("key {key:?}: {e}")))?;
    Ok(Some(ChangeToken::new(token)))
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}
