//! The import pipeline state machine.
//!
//! One coordinator instance owns one import attempt: it sequences the root
//! and resource uploads, submits the import request, then polls the resulting
//! operation until it is terminal. Every call to [`ImportCoordinator::step`]
//! performs one bounded unit of work, so a driver can interleave its own
//! processing between calls and cancellation is observed promptly.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use gallery_client::{FileUploader, GalleryClient, GalleryClientError, UploadTarget};
use gallery_types::ImportOperation;
use transfer_progress::{
    FailureKind, FileTransferUpdate, ImportFailure, ImportOutcome, ImportStatus, UploadProgressObserver,
};

/// Pipeline position. Exactly one is active at a time; transitions happen
/// only inside a single `step` invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorState {
    UploadingRoot,
    /// Uploading resource `i`, in input order. The root always precedes all
    /// resources.
    UploadingResource(usize),
    AwaitingImportSubmit,
    PollingOperation,
    Finished(ImportOutcome),
    Cancelled,
}

impl CoordinatorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CoordinatorState::Finished(_) | CoordinatorState::Cancelled)
    }
}

/// Drives one asset import attempt to completion.
///
/// A coordinator is single-use: create one per attempt, step it until the
/// returned status is terminal, then discard it.
pub struct ImportCoordinator {
    client: Arc<GalleryClient>,
    root: UploadTarget,
    resources: Vec<UploadTarget>,
    observer: Arc<dyn UploadProgressObserver>,
    cancel: CancellationToken,

    state: CoordinatorState,
    uploader: Option<FileUploader>,
    root_handle: Option<String>,
    resource_handles: Vec<String>,
    operation: Option<ImportOperation>,
    polls_made: u32,
}

impl ImportCoordinator {
    pub fn new(
        client: Arc<GalleryClient>,
        root: UploadTarget,
        resources: Vec<UploadTarget>,
        observer: Arc<dyn UploadProgressObserver>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            root,
            resources,
            observer,
            cancel,
            state: CoordinatorState::UploadingRoot,
            uploader: None,
            root_handle: None,
            resource_handles: Vec::new(),
            operation: None,
            polls_made: 0,
        }
    }

    pub fn state(&self) -> &CoordinatorState {
        &self.state
    }

    /// Advances the pipeline by one bounded unit of work and reports the
    /// status afterwards.
    ///
    /// Errors do not escape: any failure is folded into a terminal
    /// `Finished` status carrying the raw message (nothing is retried).
    /// Stepping a terminal coordinator performs no I/O and returns the
    /// terminal status unchanged.
    pub async fn step(&mut self) -> ImportStatus {
        match &self.state {
            CoordinatorState::Finished(outcome) => return ImportStatus::Finished(outcome.clone()),
            CoordinatorState::Cancelled => return ImportStatus::Cancelled,
            _ => {},
        }

        // Cancellation is observed only here, between units of work, never
        // mid-chunk or mid-request.
        if self.cancel.is_cancelled() {
            info!("cancellation requested; abandoning import");
            if let Some(uploader) = self.uploader.take() {
                uploader.abort();
            }
            self.state = CoordinatorState::Cancelled;
            return ImportStatus::Cancelled;
        }

        let step_result = match self.state.clone() {
            CoordinatorState::UploadingRoot => self.drive_upload(0).await,
            CoordinatorState::UploadingResource(index) => self.drive_upload(index + 1).await,
            CoordinatorState::AwaitingImportSubmit => self.submit_import().await,
            CoordinatorState::PollingOperation => self.poll_once().await,
            CoordinatorState::Finished(_) | CoordinatorState::Cancelled => {
                unreachable!("terminal states return early")
            },
        };

        match step_result {
            Ok(status) => status,
            Err(e) => self.fail(e),
        }
    }

    /// Drives the upload occupying `slot`: 0 is the root file, `1 + i` is
    /// resource `i`. Beginning a file (open + request headers) is its own
    /// step; each following step sends one chunk.
    async fn drive_upload(&mut self, slot: usize) -> gallery_client::Result<ImportStatus> {
        let total_files = 1 + self.resources.len();
        let file_index = slot + 1;
        let target = if slot == 0 { &self.root } else { &self.resources[slot - 1] };
        let file_name: Arc<str> = Arc::from(target.file_name().as_str());

        let Some(uploader) = self.uploader.as_mut() else {
            let size = tokio::fs::metadata(target.path()).await?.len();
            if let Some(limit) = self.client.config().max_upload_bytes {
                if size > limit {
                    return Err(GalleryClientError::UploadTooLarge { size, limit });
                }
            }

            debug!(file = %file_name, file_index, total_files, "beginning upload");
            self.uploader = Some(self.client.begin_upload(target).await?);
            return Ok(ImportStatus::Uploading {
                file_name,
                file_index,
                total_files,
                fraction: 0.0,
            });
        };

        let progress = uploader.step().await?;
        let update = FileTransferUpdate {
            file_name: file_name.clone(),
            file_index,
            total_files,
            bytes_sent: uploader.bytes_sent(),
            total_bytes: uploader.total_bytes(),
        };
        self.observer.upload_progress(update).await;

        let Some(handle) = progress.handle else {
            return Ok(ImportStatus::Uploading {
                file_name,
                file_index,
                total_files,
                fraction: progress.fraction,
            });
        };

        // Handle obtained: the uploader's file and connection are released.
        self.uploader = None;
        info!(file = %file_name, handle = %handle, "file uploaded");

        if slot == 0 {
            self.root_handle = Some(handle);
        } else {
            self.resource_handles.push(handle);
        }

        self.state = if file_index < total_files {
            // `file_index` doubles as the next slot; its resource index is one less.
            CoordinatorState::UploadingResource(file_index - 1)
        } else {
            CoordinatorState::AwaitingImportSubmit
        };

        Ok(ImportStatus::Uploading {
            file_name,
            file_index,
            total_files,
            fraction: progress.fraction,
        })
    }

    async fn submit_import(&mut self) -> gallery_client::Result<ImportStatus> {
        let Some(root_handle) = self.root_handle.clone() else {
            return Err(GalleryClientError::InternalError(anyhow_missing("root handle")));
        };

        let operation = self.client.start_import(root_handle, self.resource_handles.clone()).await?;
        info!(operation = %operation.name, "import submitted");

        self.operation = Some(operation);
        self.state = CoordinatorState::PollingOperation;
        Ok(ImportStatus::Importing)
    }

    async fn poll_once(&mut self) -> gallery_client::Result<ImportStatus> {
        let Some(operation) = self.operation.as_ref() else {
            return Err(GalleryClientError::InternalError(anyhow_missing("operation")));
        };

        if let Some(outcome) = Self::terminal_outcome(operation) {
            self.state = CoordinatorState::Finished(outcome.clone());
            return Ok(ImportStatus::Finished(outcome));
        }

        if let Some(max) = self.client.config().max_poll_attempts {
            if self.polls_made >= max {
                warn!(max, "poll budget exhausted");
                let outcome = ImportOutcome::Failed(ImportFailure::new(
                    FailureKind::Timeout,
                    format!("import did not finish after {max} polls"),
                ));
                self.state = CoordinatorState::Finished(outcome.clone());
                return Ok(ImportStatus::Finished(outcome));
            }
        }

        // Rate-limit the server; this runs on the worker, not a UI thread.
        tokio::time::sleep(self.client.config().poll_interval).await;

        let fresh = self.client.poll_operation(operation).await?;
        self.polls_made += 1;
        debug!(operation = %fresh.name, done = fresh.done, polls = self.polls_made, "operation polled");

        let status = match Self::terminal_outcome(&fresh) {
            Some(outcome) => {
                self.state = CoordinatorState::Finished(outcome.clone());
                ImportStatus::Finished(outcome)
            },
            None => ImportStatus::Importing,
        };
        self.operation = Some(fresh);
        Ok(status)
    }

    /// Maps a polled snapshot to its terminal outcome, if it has one.
    /// Operation-level errors, fatal diagnostics and completion are checked
    /// in that order.
    fn terminal_outcome(operation: &ImportOperation) -> Option<ImportOutcome> {
        if let Some(message) = &operation.error {
            error!(operation = %operation.name, %message, "operation failed");
            return Some(ImportOutcome::Failed(ImportFailure::new(FailureKind::Operation, message.clone())));
        }

        if let Some(fatal) = operation.result.as_ref().and_then(|r| r.fatal_error.clone()) {
            error!(operation = %operation.name, %fatal, "import reported a fatal diagnostic");
            return Some(ImportOutcome::Failed(ImportFailure::new(FailureKind::ResultFatal, fatal)));
        }

        if operation.done {
            match operation.result.as_ref().and_then(|r| r.publish_url.as_deref()) {
                Some(publish_url) => info!(operation = %operation.name, publish_url, "import complete"),
                None => warn!(operation = %operation.name, "operation completed without a result/publish URL"),
            }
            return Some(ImportOutcome::Completed {
                result: operation.result.clone(),
            });
        }

        None
    }

    /// Folds a client error into the terminal `Finished` state.
    fn fail(&mut self, e: GalleryClientError) -> ImportStatus {
        let kind = match (&e, &self.state) {
            (GalleryClientError::IOError(_) | GalleryClientError::UploadTooLarge { .. }, _) => FailureKind::LocalIo,
            (_, CoordinatorState::UploadingRoot | CoordinatorState::UploadingResource(_)) => FailureKind::Upload,
            (GalleryClientError::SubmitFailed(_), _) => FailureKind::Submit,
            _ => FailureKind::Transport,
        };

        error!(?kind, error = %e, "import failed");
        if let Some(uploader) = self.uploader.take() {
            uploader.abort();
        }

        let outcome = ImportOutcome::Failed(ImportFailure::new(kind, e.to_string()));
        self.state = CoordinatorState::Finished(outcome.clone());
        ImportStatus::Finished(outcome)
    }
}

fn anyhow_missing(what: &str) -> anyhow::Error {
    anyhow::anyhow!("coordinator state invariant violated: no {what}")
}
