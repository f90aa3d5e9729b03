//! Authentication of editor callbacks.
//!
//! With signing enabled the editor sends a JWT either inside the JSON body
//! (`token` field) or as `Authorization: Bearer <jwt>`. The two carry the
//! callback differently: a body token's claims *are* the callback, while a
//! header token wraps the callback under a `payload` claim.

use crate::error::{Error, Result};
use crate::token::SignatureService;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenOrigin {
    Body,
    Header,
}

/// Decoded claim segment of a verified token, tagged by where the token came from.
#[derive(Clone, Debug, PartialEq)]
pub enum VerifiedClaim {
    SelfDescribing(Value),
    Wrapped(Value),
}

impl VerifiedClaim {
    fn new(origin: TokenOrigin, claim: Value) -> Self {
        match origin {
            TokenOrigin::Body => VerifiedClaim::SelfDescribing(claim),
            TokenOrigin::Header => VerifiedClaim::Wrapped(claim),
        }
    }

    pub fn into_payload(self) -> Result<Value> {
        match self {
            VerifiedClaim::SelfDescribing(payload) => Ok(payload),
            VerifiedClaim::Wrapped(mut claim) => match claim.get_mut("payload").map(Value::take) {
                Some(payload @ Value::Object(_)) => Ok(payload),
                _ => Err(Error::MalformedPayload(
                    "header token has no payload claim".to_string(),
                )),
            },
        }
    }
}

pub struct CallbackAuthenticator {
    signatures: Option<Arc<dyn SignatureService>>,
}

impl CallbackAuthenticator {
    /// `None` disables verification and trusts the raw body.
    pub fn new(signatures: Option<Arc<dyn SignatureService>>) -> Self {
        Self { signatures }
    }

    pub fn is_enabled(&self) -> bool {
        self.signatures.is_some()
    }

    pub async fn authenticate(&self, raw_body: &[u8], authorization: Option<&str>) -> Result<Value> {
        let body: Value = serde_json::from_slice(raw_body)
            .map_err(|e| Error::MalformedPayload(e.to_string()))?;
        let Some(signatures) = &self.signatures else {
            return Ok(body);
        };

        let (token, origin) = find_token(&body, authorization).ok_or(Error::MissingToken)?;
        if !signatures.verify(&token).await {
            return Err(Error::InvalidSignature);
        }
        let claim = decode_claim_segment(&token)?;
        VerifiedClaim::new(origin, claim).into_payload()
    }
}

fn find_token(body: &Value, authorization: Option<&str>) -> Option<(String, TokenOrigin)> {
    if let Some(token) = body.get("token").and_then(Value::as_str) {
        if !token.is_empty() {
            return Some((token.to_string(), TokenOrigin::Body));
        }
    }
    let header = authorization?.trim();
    let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();
    if token.is_empty() {
        return None;
    }
    Some((token.to_string(), TokenOrigin::Header))
}

fn decode_claim_segment(token: &str) -> Result<Value> {
    let segment = token
        .split('.')
        .nth(1)
        .ok_or_else(|| Error::MalformedPayload("token has no claim segment".to_string()))?;
    let raw = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| Error::MalformedPayload(e.to_string()))?;
    serde_json::from_slice(&raw).map_err(|e| Error::MalformedPayload(e.to_string()))
}
