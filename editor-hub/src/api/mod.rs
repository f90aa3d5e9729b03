//! HTTP surface: editor sessions, content downloads and editor callbacks.

pub mod auth_middleware;
pub mod error;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use editor_hub_core::{
    auth::CallbackAuthenticator,
    callback::{CallbackEnvelope, CallbackProcessor},
    descriptor::{EditorMode, SessionDescriptorBuilder, SessionRequest},
    document::Blob,
    fetch::ContentFetcher,
    store::DocumentStore,
    token::{
        AccessTokenService, Hs256AccessTokens, Hs256Verifier, JwtSignatureService, SignatureService,
        TokenVerifier,
    },
    Error,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::debug;

use crate::config::Config;
pub use auth_middleware::AuthContext;
use error::{callback_response, ApiError};

/// Shared application state. Collaborators are injected here, never looked up.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub descriptors: Arc<SessionDescriptorBuilder>,
    pub authenticator: Arc<CallbackAuthenticator>,
    pub callbacks: Arc<CallbackProcessor>,
    pub access_tokens: Arc<dyn AccessTokenService>,
    pub verifier: Option<Arc<dyn TokenVerifier>>,
    pub trust_user_header: bool,
    pub document_server_url: String,
}

impl AppState {
    pub fn new(config: &Config, store: Arc<dyn DocumentStore>, fetcher: Arc<dyn ContentFetcher>) -> Self {
        let access_tokens: Arc<dyn AccessTokenService> =
            Arc::new(Hs256AccessTokens::new(&config.access_secret, config.access_ttl));
        let signatures: Option<Arc<dyn SignatureService>> = config
            .jwt_secret
            .as_ref()
            .map(|secret| Arc::new(JwtSignatureService::new(secret.as_bytes())) as Arc<dyn SignatureService>);
        let verifier = config
            .user_secret
            .clone()
            .map(|secret| Arc::new(Hs256Verifier::new(secret)) as Arc<dyn TokenVerifier>);

        Self {
            descriptors: Arc::new(SessionDescriptorBuilder::new(
                config.public_url.clone(),
                access_tokens.clone(),
                signatures.clone(),
            )),
            authenticator: Arc::new(CallbackAuthenticator::new(signatures)),
            callbacks: Arc::new(CallbackProcessor::new(store.clone(), fetcher)),
            store,
            access_tokens,
            verifier,
            trust_user_header: config.trust_user_header,
            document_server_url: config.document_server_url.clone(),
        }
    }
}

#[derive(Deserialize)]
struct EditorParams {
    mode: Option<String>,
    index: Option<usize>,
    digest: Option<String>,
}

#[derive(Deserialize)]
struct TokenParams {
    token: Option<String>,
}

#[derive(Deserialize)]
struct CallbackParams {
    token: Option<String>,
    digest: Option<String>,
    index: Option<usize>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/editor/{id}", get(open_editor))
        .route("/files/{id}/content/{filename}", get(get_content))
        .route(
            "/files/{id}/attachments/{index}/{filename}",
            get(get_attachment),
        )
        .route("/api/v1/callback/{id}", post(handle_callback))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn open_editor(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
    Query(params): Query<EditorParams>,
) -> Result<Response, ApiError> {
    let document = state.store.get(&id).await?;
    let principal = auth.principal();
    let descriptor = state
        .descriptors
        .build(&SessionRequest {
            document: &document,
            principal: &principal,
            mode: EditorMode::from_query(params.mode.as_deref()),
            selector: params.index,
            expected_digest: params.digest.as_deref(),
        })
        .await?;

    let mut response = Json(descriptor).into_response();
    if let Ok(value) = HeaderValue::from_str(&state.document_server_url) {
        response.headers_mut().insert("X-Document-Server", value);
    }
    Ok(response)
}

async fn get_content(
    State(state): State<AppState>,
    Path((id, _filename)): Path<(String, String)>,
    Query(params): Query<TokenParams>,
) -> Result<Response, ApiError> {
    check_access(&state, &id, params.token.as_deref()).await?;
    let document = state.store.get(&id).await?;
    let blob = document.content.ok_or(Error::NoContent)?;
    Ok(blob_response(blob))
}

async fn get_attachment(
    State(state): State<AppState>,
    Path((id, index, _filename)): Path<(String, usize, String)>,
    Query(params): Query<TokenParams>,
) -> Result<Response, ApiError> {
    check_access(&state, &id, params.token.as_deref()).await?;
    let mut document = state.store.get(&id).await?;
    let len = document.attachments.len();
    if index >= len {
        return Err(Error::AttachmentOutOfRange { index, len }.into());
    }
    Ok(blob_response(document.attachments.swap_remove(index)))
}

async fn handle_callback(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let result = process_callback(&state, &id, params, &headers, &body).await;
    callback_response(&id, result)
}

async fn process_callback(
    state: &AppState,
    id: &str,
    params: CallbackParams,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), Error> {
    // repository access first, then the editor's own signature
    let scope = state
        .access_tokens
        .verify_ignoring_expiry(params.token.as_deref().ok_or(Error::MissingAccessToken)?)
        .await?;
    if scope.resource != id {
        return Err(Error::InvalidAccessToken);
    }

    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());
    let payload = state.authenticator.authenticate(body, authorization).await?;
    let envelope =
        CallbackEnvelope::from_payload(payload)?.with_url_selector(params.digest, params.index);
    let outcome = state.callbacks.process(id, envelope).await?;
    debug!(doc = id, user = %scope.user, ?outcome, "callback processed");
    Ok(())
}

async fn check_access(state: &AppState, id: &str, token: Option<&str>) -> Result<(), ApiError> {
    let scope = state
        .access_tokens
        .verify(token.ok_or(Error::MissingAccessToken)?)
        .await?;
    if scope.resource != id {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

fn blob_response(blob: Blob) -> Response {
    let content_type = HeaderValue::from_str(blob.mime_type())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let mut response = blob.data().clone().into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, content_type);
    response
}
