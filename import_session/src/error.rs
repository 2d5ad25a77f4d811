//! Error types for import sessions.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Client error: {0}")]
    Client(#[from] gallery_client::GalleryClientError),

    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
