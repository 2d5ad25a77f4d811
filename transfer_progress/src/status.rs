//! Status snapshots shared between the import worker and the host UI thread.
//!
//! A snapshot is always replaced wholesale, never mutated in place, so a
//! reader polling from another thread can never observe a torn state.

use std::fmt;
use std::sync::Arc;

use gallery_types::ImportResult;

/// Point-in-time view of an import attempt, suitable for rendering directly.
#[derive(Clone, Debug)]
pub enum ImportStatus {
    /// The worker has not taken its first step yet.
    Queued,

    /// A file upload is in flight.
    Uploading {
        file_name: Arc<str>,
        /// 1-based index of the current file; the root file is always 1.
        file_index: usize,
        total_files: usize,
        /// Fraction of the current file sent so far, in `[0, 1]`.
        fraction: f64,
    },

    /// The import has been submitted, or is being polled. The server exposes
    /// no finer-grained progress here; hosts render a generic "Importing".
    Importing,

    /// Terminal: the import ran to completion or failed.
    Finished(ImportOutcome),

    /// Terminal: the host cancelled the attempt.
    Cancelled,
}

impl ImportStatus {
    /// True once no further steps are valid.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportStatus::Finished(_) | ImportStatus::Cancelled)
    }

    pub fn is_uploading(&self) -> bool {
        matches!(self, ImportStatus::Uploading { .. })
    }
}

/// Outcome carried by [`ImportStatus::Finished`].
#[derive(Clone, Debug, PartialEq)]
pub enum ImportOutcome {
    /// The server finished the import. The result can legitimately be absent
    /// when the server reports `done` without a response payload.
    Completed { result: Option<ImportResult> },
    Failed(ImportFailure),
}

/// Which stage of the pipeline produced a terminal failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// A local file could not be opened or read before any network call.
    LocalIo,
    /// The upload endpoint rejected a file, or returned no handle.
    Upload,
    /// The import submission was rejected.
    Submit,
    /// A response could not be transported or parsed.
    Transport,
    /// The polled operation reported a server-side error.
    Operation,
    /// The operation completed but a diagnostic carried the fatal-error code.
    ResultFatal,
    /// The poll budget was exhausted before the operation became terminal.
    Timeout,
}

/// Terminal failure with the raw server/local message preserved verbatim.
#[derive(Clone, Debug, PartialEq)]
pub struct ImportFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ImportFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ImportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The message is shown to the user untranslated.
        write!(f, "{}", self.message)
    }
}
