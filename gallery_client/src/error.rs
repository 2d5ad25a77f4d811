use thiserror::Error;
use tokio::task::JoinError;

use crate::auth::AuthError;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum GalleryClientError {
    #[error("Auth Error: {0}")]
    Auth(#[from] AuthError),

    #[error("Configuration Error: {0}")]
    ConfigurationError(String),

    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Upload failed: got status {status} - {reason}")]
    UploadFailed { status: u16, reason: String },

    #[error("Upload failed: no upload handle received.")]
    MissingUploadHandle,

    #[error("upload already completed; no further steps are valid")]
    UploadAlreadyComplete,

    #[error("file is {size} bytes, above the {limit} byte upload limit")]
    UploadTooLarge { size: u64, limit: u64 },

    #[error("Import failed ({0})")]
    SubmitFailed(u16),

    #[error("Poll failed ({0})")]
    PollFailed(u16),

    #[error("Operation name must start with 'operations/': {0}")]
    InvalidOperationName(String),

    #[error("Parse Error: {0}")]
    OperationParse(#[from] gallery_types::OperationParseError),

    #[error("Json Error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Url Parse Error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("ReqwestMiddleware Error: {0}")]
    ReqwestMiddlewareError(#[from] reqwest_middleware::Error),

    #[error("Reqwest Error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("Other Internal Error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GalleryClientError>;

impl From<JoinError> for GalleryClientError {
    fn from(value: JoinError) -> Self {
        GalleryClientError::InternalError(anyhow::anyhow!("{value:?}"))
    }
}
