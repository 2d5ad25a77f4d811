//! Immutable snapshots of a server-side import operation.

use thiserror::Error;

use crate::wire::{OperationWire, StartImportResponseWire};

/// Required prefix of every pollable operation name.
pub const OPERATION_NAME_PREFIX: &str = "operations/";

/// Diagnostic message code that marks an import as failed even when the
/// operation itself completed without a top-level error.
pub const FATAL_ERROR_CODE: &str = "FATAL_ERROR";

/// The Operation response could not be decoded.
///
/// This covers both malformed JSON and a missing required `name` field; either
/// way the server broke its contract, so the caller treats it as fatal.
#[derive(Debug, Error)]
#[error("malformed operation response: {0}")]
pub struct OperationParseError(#[from] serde_json::Error);

/// Snapshot of a server-side asynchronous import job.
///
/// Never mutated; each poll parses a fresh snapshot that replaces the previous
/// one. Once `done` is true or `error` is set the operation is terminal.
#[derive(Debug, Clone)]
pub struct ImportOperation {
    /// Server-assigned operation name, e.g. `operations/abc123`.
    pub name: String,
    pub done: bool,
    /// Transport-level operation error reported by the server.
    pub error: Option<String>,
    pub result: Option<ImportResult>,
}

/// Result payload of a completed import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportResult {
    pub asset_id: Option<String>,
    pub publish_url: Option<String>,
    /// Raw diagnostic messages, in server order.
    pub messages: Vec<String>,
    /// Set when any diagnostic message carried the fatal-error code. Distinct
    /// from the operation-level error; both must be checked.
    pub fatal_error: Option<String>,
}

impl ImportOperation {
    /// Decodes a raw Operation response body into a snapshot.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, OperationParseError> {
        let wire: OperationWire = serde_json::from_slice(bytes)?;
        Ok(Self::from(wire))
    }

    /// True once no further polling is needed.
    pub fn is_terminal(&self) -> bool {
        self.done || self.error.is_some()
    }
}

impl From<OperationWire> for ImportOperation {
    fn from(wire: OperationWire) -> Self {
        let error = wire.error.map(|e| match e.message {
            Some(message) => format!("Error: {message}"),
            None => "An error occurred.".to_string(),
        });

        Self {
            name: wire.name,
            done: wire.done,
            error,
            result: wire.response.map(ImportResult::from),
        }
    }
}

impl From<StartImportResponseWire> for ImportResult {
    fn from(wire: StartImportResponseWire) -> Self {
        let mut fatal_error = None;
        let mut messages = Vec::with_capacity(wire.asset_import_messages.len());

        for item in &wire.asset_import_messages {
            if item.get("code").and_then(|c| c.as_str()) == Some(FATAL_ERROR_CODE) {
                fatal_error = Some(item.to_string());
            }
            messages.push(item.to_string());
        }

        Self {
            asset_id: wire.asset_id,
            publish_url: wire.publish_url,
            messages,
            fatal_error,
        }
    }
}
