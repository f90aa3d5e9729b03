//! Environment-driven configuration.

use anyhow::{anyhow, Context, Result};
use editor_hub_core::Url;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    /// Base of the content and callback URLs handed to the editor service.
    pub public_url: Url,
    pub document_server_url: String,
    pub data_dir: PathBuf,
    /// Enables signed descriptors and callback verification.
    pub jwt_secret: Option<String>,
    pub access_secret: Vec<u8>,
    /// No `EDITOR_HUB_ACCESS_SECRET` was given; tokens die with the process.
    pub access_secret_generated: bool,
    pub access_ttl: Duration,
    pub user_secret: Option<String>,
    /// Accept `X-User-Id` without a bearer token. Development only.
    pub trust_user_header: bool,
    pub fetch_timeout: Duration,
}

pub fn load_config() -> Result<Config> {
    from_lookup(|key| std::env::var(key).ok())
}

pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config> {
    let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

    let addr = var("EDITOR_HUB_ADDR").unwrap_or_else(|| "127.0.0.1:3000".to_string());
    let public_url =
        var("EDITOR_HUB_PUBLIC_URL").unwrap_or_else(|| format!("http://{addr}"));
    let (access_secret, access_secret_generated) = match var("EDITOR_HUB_ACCESS_SECRET") {
        Some(secret) => (secret.into_bytes(), false),
        None => (
            [Uuid::new_v4().as_bytes().as_slice(), Uuid::new_v4().as_bytes().as_slice()].concat(),
            true,
        ),
    };

    Ok(Config {
        addr: addr
            .parse()
            .with_context(|| format!("EDITOR_HUB_ADDR {addr:?}"))?,
        public_url: Url::parse(&public_url)
            .with_context(|| format!("EDITOR_HUB_PUBLIC_URL {public_url:?}"))?,
        document_server_url: var("EDITOR_HUB_DOCUMENT_SERVER_URL")
            .unwrap_or_else(|| "http://127.0.0.1:8000".to_string()),
        data_dir: var("EDITOR_HUB_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data")),
        jwt_secret: var("EDITOR_HUB_JWT_SECRET"),
        access_secret,
        access_secret_generated,
        access_ttl: Duration::from_secs(parse_or(&var, "EDITOR_HUB_ACCESS_TTL_SECS", 3600)?),
        user_secret: var("EDITOR_HUB_USER_SECRET"),
        trust_user_header: parse_bool(&var, "EDITOR_HUB_TRUST_USER_HEADER")?,
        fetch_timeout: Duration::from_secs(parse_or(&var, "EDITOR_HUB_FETCH_TIMEOUT_SECS", 30)?),
    })
}

fn parse_or<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(value) => value
            .parse()
            .with_context(|| format!("{key} {value:?}")),
        None => Ok(default),
    }
}

fn parse_bool(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<bool> {
    match var(key).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes") => Ok(true),
        Some("0" | "false" | "no") => Ok(false),
        Some(other) => Err(anyhow!("{key} {other:?} is not a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.addr, "127.0.0.1:3000".parse().unwrap());
        assert_eq!(config.public_url.as_str(), "http://127.0.0.1:3000/");
        assert!(config.jwt_secret.is_none());
        assert!(!config.trust_user_header);
        assert_eq!(config.access_secret.len(), 32);
        assert!(config.access_secret_generated);
        assert_eq!(config.access_ttl, Duration::from_secs(3600));
    }

    #[test]
    fn overrides() {
        let config = from_lookup(lookup(&[
            ("EDITOR_HUB_PUBLIC_URL", "https://hub.example/repo/"),
            ("EDITOR_HUB_JWT_SECRET", "s3cret"),
            ("EDITOR_HUB_TRUST_USER_HEADER", "true"),
            ("EDITOR_HUB_FETCH_TIMEOUT_SECS", "5"),
            ("EDITOR_HUB_ACCESS_SECRET", "stable"),
        ]))
        .unwrap();
        assert_eq!(config.access_secret, b"stable".to_vec());
        assert!(!config.access_secret_generated);
        assert_eq!(config.public_url.path(), "/repo/");
        assert_eq!(config.jwt_secret.as_deref(), Some("s3cret"));
        assert!(config.trust_user_header);
        assert_eq!(config.fetch_timeout, Duration::from_secs(5));
    }

    #[test]
    fn malformed_values_fail() {
        assert!(from_lookup(lookup(&[("EDITOR_HUB_ACCESS_TTL_SECS", "soon")])).is_err());
        assert!(from_lookup(lookup(&[("EDITOR_HUB_TRUST_USER_HEADER", "maybe")])).is_err());
        assert!(from_lookup(lookup(&[("EDITOR_HUB_ADDR", "nowhere")])).is_err());
    }
}
