//! Fixed mapping from file extension to MIME type for upload requests.

use std::path::Path;

/// MIME type used when the extension is not in the table.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

const MIME_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("mtl", "text/plain"),
    ("obj", "text/plain"),
    ("png", "image/png"),
];

/// Returns the MIME type to declare for the given file path.
///
/// Matching is case-insensitive on the extension.
pub fn mime_type_for_path(path: impl AsRef<Path>) -> &'static str {
    let Some(ext) = path.as_ref().extension().and_then(|e| e.to_str()) else {
        return DEFAULT_MIME_TYPE;
    };
    let ext = ext.to_ascii_lowercase();

    MIME_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT_MIME_TYPE)
}
