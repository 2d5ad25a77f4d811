pub mod mime;
mod operation;
mod wire;

pub use operation::{ImportOperation, ImportResult, OperationParseError, FATAL_ERROR_CODE, OPERATION_NAME_PREFIX};
pub use wire::{ImportFormat, ImportFormatType, OperationErrorWire, OperationWire, StartImportRequest,
               StartImportResponseWire, UploadResponse};
