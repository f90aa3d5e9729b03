use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("document {0} not found")]
    DocumentNotFound(String),
    #[error("digest is required when an attachment index is given")]
    MissingDigest,
    #[error("attachment index {index} out of range ({len} attachments)")]
    AttachmentOutOfRange { index: usize, len: usize },
    #[error("document has no primary content")]
    NoContent,
    #[error("file type {0:?} cannot be opened in the editor")]
    UnsupportedFileType(String),
    #[error("digest is incorrect")]
    StaleReference,
    #[error("expected JWT")]
    MissingToken,
    #[error("JWT verification failed")]
    InvalidSignature,
    #[error("access token required")]
    MissingAccessToken,
    #[error("access token rejected")]
    InvalidAccessToken,
    #[error("unknown callback status {0}")]
    UnknownStatus(i64),
    #[error("malformed callback payload: {0}")]
    MalformedPayload(String),
    #[error("callback carries no content url")]
    MissingUrl,
    #[error("document was modified since the editing session started")]
    Conflict,
    #[error("fetching content failed: {0}")]
    Fetch(String),
    #[error("store: {0}")]
    Store(String),
    #[error("token: {0}")]
    Token(String),
}

impl Error {
    /// Authentication failures, reported distinctly from processing failures.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            Error::MissingToken
                | Error::InvalidSignature
                | Error::MissingAccessToken
                | Error::InvalidAccessToken
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Store(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Fetch(e.to_string())
    }
}
