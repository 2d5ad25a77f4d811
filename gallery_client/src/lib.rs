pub mod auth;
mod client;
mod config;
mod error;
mod file_uploader;
mod http_client;
mod import_client;

pub use client::GalleryClient;
pub use config::{GalleryConfig, DEFAULT_API_HOST, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL};
pub use error::{GalleryClientError, Result};
pub use file_uploader::{FileUploader, UploadProgress, UploadTarget};
pub use http_client::{build_auth_http_client, build_http_client, AuthMiddleware};
pub use import_client::ImportClient;
