//! Submit and poll client for the asset import API.

use gallery_types::{ImportFormat, ImportFormatType, ImportOperation, StartImportRequest, OPERATION_NAME_PREFIX};
use reqwest_middleware::ClientWithMiddleware;
use tracing::{debug, error};
use url::Url;

use crate::error::{GalleryClientError, Result};

/// Client for the import submit and operation poll endpoints.
#[derive(Debug, Clone)]
pub struct ImportClient {
    client: ClientWithMiddleware,
    import_url: String,
    poll_base_url: String,
}

impl ImportClient {
    pub fn new(client: ClientWithMiddleware, import_url: impl Into<String>, poll_base_url: impl Into<String>) -> Self {
        Self {
            client,
            import_url: import_url.into(),
            poll_base_url: poll_base_url.into(),
        }
    }

    /// Submits an import referencing the uploaded file handles and parses the
    /// Operation the server opens for it.
    pub async fn start_import(&self, root_handle: String, resource_handles: Vec<String>) -> Result<ImportOperation> {
        let request = StartImportRequest {
            import_format: ImportFormat {
                root: root_handle,
                resources: resource_handles,
                format_type: ImportFormatType::Obj,
            },
        };

        let url = Url::parse(&self.import_url)?;
        debug!(%url, "sending import request");
        let response = self.client.post(url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            error!(%status, "import submit failed");
            return Err(GalleryClientError::SubmitFailed(status.as_u16()));
        }

        let body = response.bytes().await?;
        let operation = ImportOperation::from_json_slice(&body)?;
        debug!(operation = %operation.name, "import submitted");
        Ok(operation)
    }

    /// Polls the server for a fresh snapshot of the given operation.
    ///
    /// The operation name must carry the `operations/` prefix; that is
    /// checked locally, before any network call.
    pub async fn poll_operation(&self, operation: &ImportOperation) -> Result<ImportOperation> {
        if !operation.name.starts_with(OPERATION_NAME_PREFIX) {
            return Err(GalleryClientError::InvalidOperationName(operation.name.clone()));
        }

        let url = Url::parse(&format!("{}/{}", self.poll_base_url, operation.name))?;
        debug!(%url, "polling operation");
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            error!(%status, "operation poll failed");
            return Err(GalleryClientError::PollFailed(status.as_u16()));
        }

        let body = response.bytes().await?;
        Ok(ImportOperation::from_json_slice(&body)?)
    }
}
