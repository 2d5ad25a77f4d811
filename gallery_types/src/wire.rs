//! Serde representations of the gallery REST payloads.

use serde::{Deserialize, Serialize};

/// Body of a successful response from the upload endpoint.
///
/// The server assigns one element id per uploaded file; the id is referenced
/// later in the import submission. An empty id is treated as a failed upload
/// by the caller even on a 2xx status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    #[serde(default)]
    pub element_id: String,
}

/// Body of the start-import request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartImportRequest {
    pub import_format: ImportFormat,
}

/// The set of uploaded file handles making up one asset.
///
/// `root` is the handle of the main model file; `resources` are its
/// dependencies (materials, textures), in upload order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportFormat {
    pub root: String,
    pub resources: Vec<String>,
    pub format_type: ImportFormatType,
}

/// Source format tag sent with the import submission. Only OBJ is wired up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportFormatType {
    #[serde(rename = "OBJ")]
    Obj,
}

/// Wire form of a server-side Operation, as returned by both the import
/// submit endpoint and the poll endpoint.
///
/// `name` is required; a response without it is a server contract violation
/// and fails at parse time. Everything else is optional on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationWire {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<OperationErrorWire>,
    #[serde(default)]
    pub response: Option<StartImportResponseWire>,
}

/// Error payload attached to a failed Operation. The server may omit the
/// message.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationErrorWire {
    #[serde(default)]
    pub message: Option<String>,
}

/// Wire form of the StartAssetImportResponse message carried in a completed
/// Operation.
///
/// Import messages are kept as raw JSON values: they are diagnostics for
/// logging, and only their `code` field is ever inspected.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartImportResponseWire {
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub publish_url: Option<String>,
    #[serde(default)]
    pub asset_import_messages: Vec<serde_json::Value>,
}
