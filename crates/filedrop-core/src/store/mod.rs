//! Object store abstraction
//!
//! The picker talks to storage only through [`ObjectStore::put_object`].
//! Two implementations ship with the crate:
//!
//! - [`S3Store`]: any S3-compatible bucket via `aws-sdk-s3`, authenticated
//!   with short-lived session credentials.
//! - [`MemoryStore`]: in-process map. Use for tests and dry runs.
//!
//! # Object naming
//!
//! ```text
//! bucket spec   "media/uploads"          options path "avatars"
//!   ├── bucket  "media"
//!   └── folders "/uploads/avatars"
//!
//! key  uploads/avatars/1700000000000-me.png
//! url  https://media.s3.amazonaws.com/uploads/avatars/1700000000000-me.png
//! ```

mod memory;
mod s3;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::PickerResult;
use crate::session::percent;

pub use memory::{MemoryStore, StoredObject};
pub use s3::{S3Store, SessionCredentials};

/// Storage domain appended to the bucket name in object URLs.
pub const DEFAULT_STORAGE_DOMAIN: &str = "s3.amazonaws.com";

/// Canned access control applied to uploaded objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectAcl {
    Private,
    PublicRead,
}

impl ObjectAcl {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectAcl::Private => "private",
            ObjectAcl::PublicRead => "public-read",
        }
    }
}

/// Server-side encryption requested for an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encryption {
    Aes256,
}

/// A single PUT.
#[derive(Debug, Clone)]
pub struct PutObjectRequest {
    pub key: String,
    pub acl: ObjectAcl,
    pub content_type: String,
    pub body: Bytes,
    pub encryption: Option<Encryption>,
}

/// Bytes sent so far for one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub loaded: u64,
    pub total: u64,
}

impl TransferProgress {
    pub fn percent(&self) -> u8 {
        percent(self.loaded, self.total)
    }
}

/// Callback handle a store uses to report transfer progress.
#[derive(Clone)]
pub struct ProgressSink(Arc<dyn Fn(TransferProgress) + Send + Sync>);

impl ProgressSink {
    pub fn new(f: impl Fn(TransferProgress) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// A sink that discards every report.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub fn report(&self, loaded: u64, total: u64) {
        (self.0)(TransferProgress { loaded, total });
    }
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProgressSink")
    }
}

/// Destination for uploaded files.
pub trait ObjectStore: Send + Sync + 'static {
    /// Upload one object, reporting progress through `progress`.
    ///
    /// Failures are returned as [`crate::PickerError::Transfer`].
    fn put_object(
        &self,
        request: PutObjectRequest,
        progress: ProgressSink,
    ) -> impl Future<Output = PickerResult<()>> + Send;
}

/// Where objects land and how their public URLs are built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    bucket: String,
    folders: String,
    domain: String,
}

impl ObjectLocation {
    /// `bucket_spec` may carry folders after the first `/`.
    pub fn new(bucket_spec: &str, path: Option<&str>) -> Self {
        let (bucket, mut folders) = match bucket_spec.find('/') {
            Some(i) => (
                bucket_spec[..i].to_string(),
                bucket_spec[i..].trim_end_matches('/').to_string(),
            ),
            None => (bucket_spec.to_string(), String::new()),
        };
        if let Some(path) = path.filter(|p| !p.is_empty()) {
            folders.push('/');
            folders.push_str(path);
        }
        Self {
            bucket,
            folders,
            domain: DEFAULT_STORAGE_DOMAIN.to_string(),
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Folder path with a leading `/`, or empty.
    pub fn folders(&self) -> &str {
        &self.folders
    }

    /// Object key for `name` inside the bucket.
    pub fn key_for(&self, name: &str) -> String {
        let folders = self.folders.trim_start_matches('/');
        if folders.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", folders, name)
        }
    }

    /// Public URL of the object stored under `name`.
    pub fn url_for(&self, name: &str) -> String {
        format!(
            "https://{}.{}{}/{}",
            self.bucket,
            self.domain,
            self.folders,
            encode_uri_component(name)
        )
    }
}

/// `<millis>-<original name>`
pub fn unique_object_name(millis: i64, name: &str) -> String {
    format!("{}-{}", millis, name)
}

/// Percent-encode everything except `A-Z a-z 0-9 - _ . ! ~ * ( )`.
///
/// Matches the browser's `encodeURIComponent` except that `'` is escaped
/// too, since it breaks quoted attribute values.
pub fn encode_uri_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'('
            | b')' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_plain_bucket() {
        let loc = ObjectLocation::new("media", None);
        assert_eq!(loc.key_for("1-a.png"), "1-a.png");
        assert_eq!(loc.url_for("1-a.png"), "https://media.s3.amazonaws.com/1-a.png");
    }

    #[test]
    fn test_location_with_folders_and_path() {
        let loc = ObjectLocation::new("media/uploads", Some("avatars"));
        assert_eq!(loc.bucket(), "media");
        assert_eq!(loc.folders(), "/uploads/avatars");
        assert_eq!(loc.key_for("1-a.png"), "uploads/avatars/1-a.png");
        assert_eq!(
            loc.url_for("1-a.png"),
            "https://media.s3.amazonaws.com/uploads/avatars/1-a.png"
        );
    }

    #[test]
    fn test_custom_domain() {
        let loc = ObjectLocation::new("media", Some("x")).with_domain("r2.example.com");
        assert_eq!(loc.url_for("f"), "https://media.r2.example.com/x/f");
    }

    #[test]
    fn test_encode_uri_component() {
        assert_eq!(encode_uri_component("my file.png"), "my%20file.png");
        assert_eq!(encode_uri_component("it's.png"), "it%27s.png");
        assert_eq!(encode_uri_component("a&b=c/d"), "a%26b%3Dc%2Fd");
        assert_eq!(encode_uri_component("(x)!~*"), "(x)!~*");
        assert_eq!(encode_uri_component("é"), "%C3%A9");
    }

    #[test]
    fn test_unique_name() {
        assert_eq!(unique_object_name(1700000000000, "cat.png"), "1700000000000-cat.png");
    }

    #[test]
    fn test_progress_percent() {
        let p = TransferProgress { loaded: 2, total: 3 };
        assert_eq!(p.percent(), 67);
    }
}
