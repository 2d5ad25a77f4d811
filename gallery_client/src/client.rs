//! Entry point tying together config, auth and the two endpoint clients.

use reqwest_middleware::ClientWithMiddleware;

use gallery_types::ImportOperation;

use crate::auth::AuthConfig;
use crate::config::GalleryConfig;
use crate::error::Result;
use crate::file_uploader::{FileUploader, UploadTarget};
use crate::http_client::build_auth_http_client;
use crate::import_client::ImportClient;

/// One configured connection to the gallery service.
///
/// Owns the HTTP client (with bearer-auth middleware when configured) shared
/// by uploads, import submissions and operation polls.
#[derive(Debug)]
pub struct GalleryClient {
    http: ClientWithMiddleware,
    import: ImportClient,
    config: GalleryConfig,
}

impl GalleryClient {
    pub fn new(config: GalleryConfig, auth: &Option<AuthConfig>) -> Result<Self> {
        let http = build_auth_http_client(auth)?;
        let import = ImportClient::new(http.clone(), config.import_url.clone(), config.poll_base_url.clone());
        Ok(Self { http, import, config })
    }

    pub fn config(&self) -> &GalleryConfig {
        &self.config
    }

    /// Opens `target` and starts its upload; drive the returned uploader with
    /// repeated `step` calls.
    pub async fn begin_upload(&self, target: &UploadTarget) -> Result<FileUploader> {
        FileUploader::begin(&self.http, &self.config.upload_url, target, self.config.chunk_size).await
    }

    /// See [`ImportClient::start_import`].
    pub async fn start_import(&self, root_handle: String, resource_handles: Vec<String>) -> Result<ImportOperation> {
        self.import.start_import(root_handle, resource_handles).await
    }

    /// See [`ImportClient::poll_operation`].
    pub async fn poll_operation(&self, operation: &ImportOperation) -> Result<ImportOperation> {
        self.import.poll_operation(operation).await
    }
}
