use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, StatusCode},
};
use editor_hub_core::descriptor::Principal;

use super::AppState;

const DEFAULT_LOCALE: &str = "en";

/// The user opening an editor.
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub user_id: String,
    pub user_name: String,
    pub locale: String,
}

impl AuthContext {
    pub fn principal(&self) -> Principal {
        Principal {
            id: self.user_id.clone(),
            name: self.user_name.clone(),
            locale: self.locale.clone(),
        }
    }
}

/// Extract auth context from request
pub async fn extract_auth_context(
    headers: &HeaderMap,
    state: &AppState,
) -> Result<AuthContext, StatusCode> {
    let locale = locale_from(headers);

    if let Some(verifier) = &state.verifier {
        if let Some(token) = headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
        {
            if let Some(claims) = verifier.verify(token).await {
                return Ok(AuthContext {
                    user_name: claims.name.unwrap_or_else(|| claims.sub.clone()),
                    user_id: claims.sub,
                    locale,
                });
            }
        }
    }

    // development fallback
    if state.trust_user_header {
        if let Some(user_id) = headers.get("X-User-Id").and_then(|h| h.to_str().ok()) {
            if !user_id.is_empty() {
                return Ok(AuthContext {
                    user_id: user_id.to_string(),
                    user_name: user_id.to_string(),
                    locale,
                });
            }
        }
    }

    Err(StatusCode::UNAUTHORIZED)
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        extract_auth_context(&parts.headers, state).await
    }
}

/// First language tag of `Accept-Language`, quality values ignored.
fn locale_from(headers: &HeaderMap) -> String {
    headers
        .get(header::ACCEPT_LANGUAGE)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|tag| tag.split(';').next().unwrap_or(tag).trim())
        .filter(|tag| !tag.is_empty() && *tag != "*")
        .unwrap_or(DEFAULT_LOCALE)
        .to_string()
}
