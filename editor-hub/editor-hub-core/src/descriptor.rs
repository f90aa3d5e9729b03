//! Session descriptors handed to the editor service when a user opens a
//! document.

use crate::document::{Blob, Document};
use crate::error::{Error, Result};
use crate::key::make_key;
use crate::token::{AccessScope, AccessTokenService, Capability, SignatureService};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditorMode {
    View,
    Edit,
}

impl EditorMode {
    /// Only the literal `edit` grants editing.
    pub fn from_query(mode: Option<&str>) -> Self {
        match mode {
            Some("edit") => EditorMode::Edit,
            _ => EditorMode::View,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Text,
    Spreadsheet,
    Presentation,
}

const TEXT_EXTS: &[&str] = &[
    "doc", "docx", "docm", "dot", "dotx", "dotm", "odt", "ott", "fodt", "rtf", "txt", "html",
    "htm", "mht", "epub", "pdf", "djvu", "xps",
];
const SPREADSHEET_EXTS: &[&str] = &[
    "xls", "xlsx", "xlsm", "xlt", "xltx", "xltm", "ods", "ots", "fods", "csv",
];
const PRESENTATION_EXTS: &[&str] = &[
    "ppt", "pptx", "pptm", "pps", "ppsx", "ppsm", "pot", "potx", "potm", "odp", "otp", "fodp",
];

impl DocumentKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        if TEXT_EXTS.contains(&ext) {
            Some(DocumentKind::Text)
        } else if SPREADSHEET_EXTS.contains(&ext) {
            Some(DocumentKind::Spreadsheet)
        } else if PRESENTATION_EXTS.contains(&ext) {
            Some(DocumentKind::Presentation)
        } else {
            None
        }
    }
}

/// Mime type for an editable extension, used when importing files.
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext {
        "doc" | "dot" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "odt" => "application/vnd.oasis.opendocument.text",
        "rtf" => "application/rtf",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "pdf" => "application/pdf",
        "epub" => "application/epub+zip",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ods" => "application/vnd.oasis.opendocument.spreadsheet",
        "csv" => "text/csv",
        "ppt" | "pps" | "pot" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "odp" => "application/vnd.oasis.opendocument.presentation",
        _ => "application/octet-stream",
    }
}

/// The authenticated caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub name: String,
    pub locale: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub edit: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSection {
    pub title: String,
    pub url: String,
    pub file_type: String,
    pub key: String,
    pub permissions: Permissions,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorConfig {
    pub lang: String,
    pub mode: EditorMode,
    pub callback_url: String,
    pub user: UserInfo,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    pub width: String,
    pub height: String,
    pub document_type: DocumentKind,
    pub document: DocumentSection,
    pub editor_config: EditorConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

pub struct SessionRequest<'a> {
    pub document: &'a Document,
    pub principal: &'a Principal,
    pub mode: EditorMode,
    /// Attachment position; `None` targets the primary content.
    pub selector: Option<usize>,
    pub expected_digest: Option<&'a str>,
}

pub struct SessionDescriptorBuilder {
    base_url: Url,
    tokens: Arc<dyn AccessTokenService>,
    signer: Option<Arc<dyn SignatureService>>,
}

struct Target<'a> {
    blob: &'a Blob,
    title: String,
    content_path: Vec<String>,
    callback_digest: Option<&'a str>,
}

impl SessionDescriptorBuilder {
    pub fn new(
        base_url: Url,
        tokens: Arc<dyn AccessTokenService>,
        signer: Option<Arc<dyn SignatureService>>,
    ) -> Self {
        Self {
            base_url,
            tokens,
            signer,
        }
    }

    pub async fn build(&self, request: &SessionRequest<'_>) -> Result<SessionDescriptor> {
        let doc = request.document;
        let target = resolve_target(request)?;
        let ext = target.blob.extension();
        let kind =
            DocumentKind::from_extension(&ext).ok_or_else(|| Error::UnsupportedFileType(ext.clone()))?;

        let token = self
            .tokens
            .issue(&AccessScope {
                user: request.principal.id.clone(),
                resource: doc.id.clone(),
                capability: Capability::ReadWrite,
            })
            .await?;

        let mut content_path = vec!["files".to_string(), doc.id.clone()];
        content_path.extend(target.content_path);
        content_path.push(target.blob.filename().to_string());
        let mut content_url = self.url_with_path(&content_path)?;
        content_url.query_pairs_mut().append_pair("token", &token);

        let mut callback_url = self.url_with_path(&["api", "v1", "callback", doc.id.as_str()])?;
        {
            let mut query = callback_url.query_pairs_mut();
            if let Some(digest) = target.callback_digest {
                query.append_pair("digest", digest);
            }
            query.append_pair("token", &token);
        }

        let edit = request.mode == EditorMode::Edit;
        let mut descriptor = SessionDescriptor {
            kind: "desktop".to_string(),
            width: "100%".to_string(),
            height: "100%".to_string(),
            document_type: kind,
            document: DocumentSection {
                title: target.title,
                url: content_url.to_string(),
                file_type: ext,
                key: make_key(doc, request.selector),
                permissions: Permissions { edit },
            },
            editor_config: EditorConfig {
                lang: request.principal.locale.clone(),
                mode: request.mode,
                callback_url: callback_url.to_string(),
                user: UserInfo {
                    id: request.principal.id.clone(),
                    name: request.principal.name.clone(),
                },
            },
            token: None,
        };

        if let Some(signer) = &self.signer {
            let payload =
                serde_json::to_value(&descriptor).map_err(|e| Error::Token(e.to_string()))?;
            descriptor.token = Some(signer.sign(&payload).await?);
        }

        debug!(doc = %doc.id, key = %descriptor.document.key, mode = ?request.mode, "built session descriptor");
        Ok(descriptor)
    }

    fn url_with_path<S: AsRef<str>>(&self, segments: &[S]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Token(format!("base url {} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn resolve_target<'a>(request: &SessionRequest<'a>) -> Result<Target<'a>> {
    let doc = request.document;
    match request.selector {
        None => {
            let blob = doc.content.as_ref().ok_or(Error::NoContent)?;
            Ok(Target {
                blob,
                title: doc.title.clone(),
                content_path: vec!["content".to_string()],
                callback_digest: None,
            })
        }
        Some(index) => {
            let expected = request.expected_digest.ok_or(Error::MissingDigest)?;
            let blob = doc.attachment(index).ok_or(Error::AttachmentOutOfRange {
                index,
                len: doc.attachments.len(),
            })?;
            if blob.digest() != expected {
                return Err(Error::StaleReference);
            }
            Ok(Target {
                blob,
                title: blob.filename().to_string(),
                content_path: vec!["attachments".to_string(), index.to_string()],
                callback_digest: Some(expected),
            })
        }
    }
}
