//! Remote path helpers.
//!
//! Remote paths are slash-separated and relative to the store root.
//! The empty string is the root itself.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::error::QueueError;

/// Characters left unescaped inside a single path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Validates and normalizes an upload destination.
///
/// Leading, trailing and repeated slashes are dropped, so `/docs/` and
/// `docs` name the same directory.
///
/// Rejects:
/// - NUL bytes
/// - Backslashes
/// - Parent directory traversal (`..`)
/// - Hidden segments (leading `.`)
pub fn normalize_target_path(path: &str) -> Result<String, QueueError> {
    if path.contains('\0') {
        return Err(QueueError::InvalidPath("path contains null bytes".into()));
    }
    if path.contains('\\') {
        return Err(QueueError::InvalidPath(format!(
            "backslashes not allowed: {path}"
        )));
    }
    if path.contains("..") {
        return Err(QueueError::InvalidPath(format!(
            "parent directory traversal not allowed: {path}"
        )));
    }

    let segments: Vec<&str> = segments(path).collect();
    if let Some(hidden) = segments.iter().find(|s| s.starts_with('.')) {
        return Err(QueueError::InvalidPath(format!(
            "hidden segment not allowed: {hidden}"
        )));
    }

    Ok(segments.join("/"))
}

/// Percent-encodes each segment separately, keeping the slashes.
pub fn encode_path_for_api(path: &str) -> String {
    segments(path)
        .map(|s| utf8_percent_encode(s, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}
