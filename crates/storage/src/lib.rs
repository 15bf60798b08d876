//! Cloud storage backends for request attachments and profile pictures.
//!
//! Every backend speaks the same folder/file contract: upload bytes under a
//! filename into a folder and get back a provider file id, or list the files
//! in a folder. Callers treat both operations as best-effort.

use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use thiserror::Error;

pub mod drive;
pub mod local;
pub mod s3;

pub use drive::{DriveStorage, ServiceAccountKey};
pub use local::LocalStorage;
pub use s3::S3Storage;

/// A file as reported by a storage backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFile {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage is not configured: {0}")]
    NotConfigured(String),

    #[error("Authentication with storage provider failed: {0}")]
    Auth(String),

    #[error("Storage provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response from storage provider")]
    InvalidResponse,

    #[error("Invalid file or folder name: {0}")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Short backend identifier used in logs and health output
    fn backend_name(&self) -> &'static str;

    /// Upload `data` as `filename` into `folder_id`, returning the provider file id.
    ///
    /// `content_type` is what the client declared, if anything; backends that
    /// record a MIME type fall back to [`effective_content_type`].
    async fn upload(
        &self,
        data: Bytes,
        filename: &str,
        content_type: Option<&str>,
        folder_id: &str,
    ) -> Result<String, StorageError>;

    /// List the files directly inside `folder_id`
    async fn list(&self, folder_id: &str) -> Result<Vec<StoredFile>, StorageError>;

    /// Public link for a stored file, if the backend has one
    fn share_link(&self, _file_id: &str) -> Option<String> {
        None
    }

    /// Health check - tests connectivity and returns latency in milliseconds
    async fn health_check(&self) -> Result<u64, StorageError>;
}

static FOLDER_ID_RE: OnceLock<Regex> = OnceLock::new();

fn folder_id_regex() -> &'static Regex {
    FOLDER_ID_RE.get_or_init(|| {
        Regex::new(r"/folders/([a-zA-Z0-9_-]{10,})").expect("folder id pattern is valid")
    })
}

/// Extract a folder id from a full folder link, or return the raw id.
///
/// Returns `None` for empty input.
pub fn extract_folder_id(link_or_id: &str) -> Option<String> {
    let trimmed = link_or_id.trim();
    if trimmed.is_empty() {
        return None;
    }
    match folder_id_regex().captures(trimmed) {
        Some(caps) => caps.get(1).map(|m| m.as_str().to_string()),
        None => Some(trimmed.to_string()),
    }
}

/// Guess a MIME type from the file extension
pub fn content_type_for(filename: &str) -> &'static str {
    let extension = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "txt" => "text/plain",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

/// The client's declared type unless it is missing or the generic binary
/// type, otherwise a guess from the extension
pub fn effective_content_type<'a>(declared: Option<&'a str>, filename: &str) -> &'a str {
    match declared.map(str::trim) {
        Some(ct) if !ct.is_empty() && ct != "application/octet-stream" => ct,
        _ => content_type_for(filename),
    }
}

/// Reject names that could escape a folder on path-based backends
pub(crate) fn safe_component(name: &str) -> Result<&str, StorageError> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains('/')
        || trimmed.contains('\\')
        || trimmed.contains('\0')
    {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_folder_id_from_link() {
        let link = "https://drive.google.com/drive/folders/1AbCdEfGhIjKlMnOp?usp=sharing";
        assert_eq!(extract_folder_id(link).as_deref(), Some("1AbCdEfGhIjKlMnOp"));
    }

    #[test]
    fn test_extract_folder_id_raw_id() {
        assert_eq!(extract_folder_id("  1AbCdEfGhIj  ").as_deref(), Some("1AbCdEfGhIj"));
        assert_eq!(extract_folder_id("   "), None);
    }

    #[test]
    fn test_short_folder_segment_is_not_an_id() {
        // Fewer than 10 id characters after /folders/ is kept verbatim
        let link = "https://drive.google.com/drive/folders/abc";
        assert_eq!(extract_folder_id(link).as_deref(), Some(link));
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("photo.JPG"), "image/jpeg");
        assert_eq!(content_type_for("brief.pdf"), "application/pdf");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }

    #[test]
    fn test_effective_content_type_prefers_declared() {
        assert_eq!(effective_content_type(Some("image/heic"), "photo.jpg"), "image/heic");
        assert_eq!(effective_content_type(Some("application/octet-stream"), "photo.jpg"), "image/jpeg");
        assert_eq!(effective_content_type(Some(" "), "clip.mov"), "video/quicktime");
        assert_eq!(effective_content_type(None, "noext"), "application/octet-stream");
    }

    #[test]
    fn test_safe_component() {
        assert!(safe_component("photo.png").is_ok());
        assert!(safe_component("..").is_err());
        assert!(safe_component("a/b").is_err());
        assert!(safe_component("").is_err());
    }
}
