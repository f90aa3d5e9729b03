//! Identity and token primitives.
//!
//! Three concerns share HS256 JWTs here: short-lived access tokens embedded
//! in content and callback URLs, signatures exchanged with the editor
//! service, and bearer tokens identifying the user who opens an editor.

use crate::error::{Error, Result};
use async_trait::async_trait;
use jsonwebtoken::{
    decode, encode, get_current_timestamp, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capability {
    #[serde(rename = "r")]
    Read,
    #[serde(rename = "rw")]
    ReadWrite,
}

/// What an access token grants: one user, one resource, one capability.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessScope {
    pub user: String,
    pub resource: String,
    pub capability: Capability,
}

#[async_trait]
pub trait AccessTokenService: Send + Sync {
    async fn issue(&self, scope: &AccessScope) -> Result<String>;
    async fn verify(&self, token: &str) -> Result<AccessScope>;

    /// Signature and scope only. Editor callbacks arrive whenever the session
    /// ends, which may be long after the token's expiry.
    async fn verify_ignoring_expiry(&self, token: &str) -> Result<AccessScope>;
}

#[derive(Serialize, Deserialize)]
struct AccessClaims {
    sub: String,
    res: String,
    cap: Capability,
    iat: u64,
    exp: u64,
}

pub struct Hs256AccessTokens {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl Hs256AccessTokens {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }
}

#[async_trait]
impl AccessTokenService for Hs256AccessTokens {
    async fn issue(&self, scope: &AccessScope) -> Result<String> {
        let iat = get_current_timestamp();
        let claims = AccessClaims {
            sub: scope.user.clone(),
            res: scope.resource.clone(),
            cap: scope.capability,
            iat,
            exp: iat + self.ttl.as_secs(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| Error::Token(e.to_string()))
    }

    async fn verify(&self, token: &str) -> Result<AccessScope> {
        self.scope_from(token, Validation::new(Algorithm::HS256))
    }

    async fn verify_ignoring_expiry(&self, token: &str) -> Result<AccessScope> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        self.scope_from(token, validation)
    }
}

impl Hs256AccessTokens {
    fn scope_from(&self, token: &str, validation: Validation) -> Result<AccessScope> {
        let data = decode::<AccessClaims>(token, &self.decoding, &validation)
            .map_err(|_| Error::InvalidAccessToken)?;
        Ok(AccessScope {
            user: data.claims.sub,
            resource: data.claims.res,
            capability: data.claims.cap,
        })
    }
}

/// Signs and verifies payloads exchanged with the editor service.
#[async_trait]
pub trait SignatureService: Send + Sync {
    async fn sign(&self, payload: &Value) -> Result<String>;
    async fn verify(&self, token: &str) -> bool;
}

pub struct JwtSignatureService {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtSignatureService {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

#[async_trait]
impl SignatureService for JwtSignatureService {
    async fn sign(&self, payload: &Value) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), payload, &self.encoding)
            .map_err(|e| Error::Token(e.to_string()))
    }

    async fn verify(&self, token: &str) -> bool {
        // exp is honoured when present but not required
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        decode::<Value>(token, &self.decoding, &validation).is_ok()
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Identifies the user opening an editor.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Option<Claims>;
}

pub struct Hs256Verifier {
    key: DecodingKey,
}

impl Hs256Verifier {
    pub fn new(secret: String) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

#[async_trait]
impl TokenVerifier for Hs256Verifier {
    async fn verify(&self, token: &str) -> Option<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        decode::<Claims>(token, &self.key, &validation)
            .ok()
            .map(|d| d.claims)
    }
}
