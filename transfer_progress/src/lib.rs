mod status;

pub use status::{FailureKind, ImportFailure, ImportOutcome, ImportStatus};

use std::sync::Arc;

/// Progress report for one sent chunk of one file in an upload sequence.
///
/// Emitted once per chunk, during upload phases only; submit and poll phases
/// produce no fine-grained progress.
#[derive(Clone, Debug)]
pub struct FileTransferUpdate {
    pub file_name: Arc<str>,

    /// 1-based position of this file in the upload sequence (the root file is
    /// always 1).
    pub file_index: usize,

    /// Total number of files in the sequence, root included.
    pub total_files: usize,

    pub bytes_sent: u64,
    pub total_bytes: u64,
}

/// The trait a host implements to receive per-chunk upload progress.
#[async_trait::async_trait]
pub trait UploadProgressObserver: std::fmt::Debug + Send + Sync {
    async fn upload_progress(&self, update: FileTransferUpdate);
}

/// Observer that discards all updates.
#[derive(Debug, Default)]
pub struct NoOpProgressObserver;

impl NoOpProgressObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

#[async_trait::async_trait]
impl UploadProgressObserver for NoOpProgressObserver {
    async fn upload_progress(&self, _update: FileTransferUpdate) {}
}
