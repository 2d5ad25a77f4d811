//! Host-facing driver support for one import attempt.
//!
//! The blocking sequence (chunk sends, submit, polls) runs on a background
//! worker task; the host thread polls a shared status snapshot once per UI
//! tick. The snapshot is always replaced wholesale, never mutated in place,
//! so the reader can never observe a torn state.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use gallery_client::auth::AuthConfig;
use gallery_client::{GalleryClient, GalleryConfig, UploadTarget};
use transfer_progress::{ImportStatus, UploadProgressObserver};

use crate::coordinator::ImportCoordinator;
use crate::error::Result;

/// One import attempt running on a background worker.
///
/// Create it with [`start`](Self::start), poll [`status`](Self::status) from
/// the host's timer tick, request cancellation with [`cancel`](Self::cancel),
/// and [`wait`](Self::wait) for the terminal status. A session is single-use;
/// once terminal, drop it and start a new one for the next attempt.
pub struct ImportSession {
    status_rx: watch::Receiver<ImportStatus>,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl ImportSession {
    /// Builds a [`GalleryClient`] for `config`/`auth` and starts a session
    /// with it.
    pub fn start_new(
        config: GalleryConfig,
        auth: &Option<AuthConfig>,
        root: UploadTarget,
        resources: Vec<UploadTarget>,
        observer: Arc<dyn UploadProgressObserver>,
    ) -> Result<Self> {
        let client = Arc::new(GalleryClient::new(config, auth)?);
        Ok(Self::start(client, root, resources, observer))
    }

    /// Spawns the worker and begins with the root file upload. Resource files
    /// are uploaded strictly in the given order, after the root.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        client: Arc<GalleryClient>,
        root: UploadTarget,
        resources: Vec<UploadTarget>,
        observer: Arc<dyn UploadProgressObserver>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (status_tx, status_rx) = watch::channel(ImportStatus::Queued);

        let mut coordinator = ImportCoordinator::new(client, root, resources, observer, cancel.clone());
        let worker = tokio::spawn(async move {
            loop {
                let status = coordinator.step().await;
                let terminal = status.is_terminal();
                status_tx.send_replace(status);
                if terminal {
                    break;
                }
            }
            debug!("import worker finished");
        });

        Self {
            status_rx,
            cancel,
            worker: Some(worker),
        }
    }

    /// Latest status snapshot. Cheap enough to call once per UI tick.
    pub fn status(&self) -> ImportStatus {
        self.status_rx.borrow().clone()
    }

    /// Requests cooperative cancellation. The worker observes the flag at its
    /// next step boundary (never mid-chunk or mid-request), aborts any
    /// in-flight upload and goes terminal. Files already uploaded stay
    /// orphaned on the server.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// True once no further status changes will happen.
    pub fn is_terminal(&self) -> bool {
        self.status_rx.borrow().is_terminal()
    }

    /// Waits for the worker to go terminal and returns the final status.
    pub async fn wait(&mut self) -> Result<ImportStatus> {
        if let Some(worker) = self.worker.take() {
            worker.await?;
        }
        Ok(self.status())
    }
}

impl Drop for ImportSession {
    fn drop(&mut self) {
        // Dropping the session abandons the attempt; the worker sees the
        // cancellation at its next step and shuts down cleanly.
        self.cancel.cancel();
    }
}
