//! Core types for filedrop
//!
//! Defines the selected files handed to the picker and the result handed
//! back once every upload has finished.

use std::path::Path;

use bytes::Bytes;
use image::ImageFormat;
use serde::{Deserialize, Serialize};

use crate::error::PickerResult;

/// Fallback content type for files we cannot classify.
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A single file chosen by the user.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedFile {
    /// Original file name (no directory part)
    pub name: String,
    /// Size of the body in bytes
    pub size: u64,
    /// Mime type as reported by the selection source (may be empty)
    pub mime: String,
    /// Last-modified time in milliseconds since the epoch
    pub last_modified: i64,
    /// File contents
    pub body: Bytes,
}

impl SelectedFile {
    /// Create a file from in-memory contents, stamped with the current time.
    pub fn new(name: impl Into<String>, mime: impl Into<String>, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self {
            name: name.into(),
            size: body.len() as u64,
            mime: mime.into(),
            last_modified: now_millis(),
            body,
        }
    }

    /// Override the last-modified timestamp.
    pub fn with_last_modified(mut self, millis: i64) -> Self {
        self.last_modified = millis;
        self
    }

    /// Read a file from disk, inferring its mime type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> PickerResult<Self> {
        let path = path.as_ref();
        let body = tokio::fs::read(path).await?;
        let metadata = tokio::fs::metadata(path).await?;

        let last_modified = metadata
            .modified()
            .ok()
            .map(|t| chrono::DateTime::<chrono::Utc>::from(t).timestamp_millis())
            .unwrap_or_else(now_millis);

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime = mime_for_name(&name);

        Ok(Self::new(name, mime, body).with_last_modified(last_modified))
    }

    /// Text after the last `.` in the name, or the whole name if it has none.
    pub fn extension(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Whether this file should be decoded as an image before upload.
    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }

    /// Mime type, or the extension when the source reported none.
    pub fn display_type(&self) -> &str {
        if self.mime.is_empty() {
            self.extension()
        } else {
            &self.mime
        }
    }
}

/// Infer a mime type from a file name.
pub fn mime_for_name(name: &str) -> String {
    let ext = match name.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return DEFAULT_MIME.to_string(),
    };

    if let Some(format) = ImageFormat::from_extension(&ext) {
        return format.to_mime_type().to_string();
    }

    let mime = match ext.as_str() {
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "zip" => "application/zip",
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        "stl" => "model/stl",
        _ => DEFAULT_MIME,
    };
    mime.to_string()
}

/// Ordered set of files from one browse or drop event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileSelection {
    files: Vec<SelectedFile>,
}

impl FileSelection {
    pub fn new(files: Vec<SelectedFile>) -> Self {
        Self { files }
    }

    pub fn single(file: SelectedFile) -> Self {
        Self { files: vec![file] }
    }

    /// Load every path into a selection, preserving order.
    pub async fn from_paths<P: AsRef<Path>>(paths: &[P]) -> PickerResult<Self> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            files.push(SelectedFile::from_path(path).await?);
        }
        Ok(Self { files })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SelectedFile> {
        self.files.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SelectedFile> {
        self.files.iter()
    }

    /// Sum of all file sizes.
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    pub fn into_files(self) -> Vec<SelectedFile> {
        self.files
    }
}

impl FromIterator<SelectedFile> for FileSelection {
    fn from_iter<I: IntoIterator<Item = SelectedFile>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

/// Lightweight description of an uploaded blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobDescriptor {
    pub filename: String,
    pub size: u64,
}

/// URLs and descriptors of a finished upload, index-aligned with the selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub urls: Vec<String>,
    pub blobs: Vec<BlobDescriptor>,
}

impl UploadResult {
    /// The single URL of a one-file upload.
    pub fn first_url(&self) -> Option<&str> {
        self.urls.first().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_without_dot_is_whole_name() {
        let file = SelectedFile::new("README", "", vec![1u8]);
        assert_eq!(file.extension(), "README");
        assert_eq!(file.display_type(), "README");

        let file = SelectedFile::new("photo.final.PNG", "image/png", vec![1u8]);
        assert_eq!(file.extension(), "PNG");
    }

    #[test]
    fn test_mime_for_name() {
        assert_eq!(mime_for_name("a.png"), "image/png");
        assert_eq!(mime_for_name("a.JPG"), "image/jpeg");
        assert_eq!(mime_for_name("doc.pdf"), "application/pdf");
        assert_eq!(mime_for_name("noext"), DEFAULT_MIME);
        assert_eq!(mime_for_name("weird.xyz"), DEFAULT_MIME);
    }

    #[test]
    fn test_selection_total_size() {
        let selection: FileSelection = vec![
            SelectedFile::new("a.txt", "text/plain", vec![0u8; 10]),
            SelectedFile::new("b.txt", "text/plain", vec![0u8; 32]),
        ]
        .into_iter()
        .collect();

        assert_eq!(selection.len(), 2);
        assert_eq!(selection.total_size(), 42);
    }

    #[tokio::test]
    async fn test_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();

        let file = SelectedFile::from_path(&path).await.unwrap();
        assert_eq!(file.name, "notes.txt");
        assert_eq!(file.size, 5);
        assert_eq!(file.mime, "text/plain");
        assert!(file.last_modified > 0);
    }
}
