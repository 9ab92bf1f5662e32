//! S3-compatible object store.

use std::error::Error;
use std::fmt;
use std::future::Future;
use std::ops::Range;
use std::time::SystemTime;

use aws_credential_types::Credentials;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    CompletedMultipartUpload, CompletedPart, ObjectCannedAcl, ServerSideEncryption,
};
use aws_sdk_s3::Client;
use aws_types::region::Region;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Encryption, ObjectAcl, ObjectStore, ProgressSink, PutObjectRequest};
use crate::error::{PickerError, PickerResult};

/// Temporary credentials issued by a server for one upload window.
///
/// Long-lived access keys are refused: a key pair without a session token
/// and an expiry never reaches the SDK.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl SessionCredentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: Some(session_token.into()),
            expires_at: Some(expires_at),
        }
    }

    /// Refuse long-lived or expired credentials.
    pub fn check(&self, now: DateTime<Utc>) -> PickerResult<()> {
        if self.access_key_id.is_empty() || self.secret_access_key.is_empty() {
            return Err(PickerError::Configuration(
                "store credentials are incomplete".to_string(),
            ));
        }
        if self.session_token.as_deref().map_or(true, str::is_empty) {
            return Err(PickerError::Configuration(
                "long-lived access keys are not accepted; supply a server-issued session token"
                    .to_string(),
            ));
        }
        match self.expires_at {
            None => Err(PickerError::Configuration(
                "session credentials must carry an expiry".to_string(),
            )),
            Some(expiry) if expiry <= now => Err(PickerError::Configuration(format!(
                "session credentials expired at {}",
                expiry.to_rfc3339()
            ))),
            Some(_) => Ok(()),
        }
    }
}

/// Uploads straight to an S3 (or S3-compatible) bucket.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Build a client for `bucket` from short-lived credentials.
    ///
    /// `endpoint` switches to path-style addressing for S3-compatible
    /// services (MinIO, R2, ...).
    pub async fn connect(
        bucket: &str,
        region: &str,
        endpoint: Option<&str>,
        credentials: &SessionCredentials,
    ) -> PickerResult<Self> {
        credentials.check(Utc::now())?;

        let creds = Credentials::new(
            &credentials.access_key_id,
            &credentials.secret_access_key,
            credentials.session_token.clone(),
            credentials.expires_at.map(SystemTime::from),
            "filedrop",
        );

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(creds);
        if let Some(endpoint) = endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(endpoint.is_some())
            .build();

        info!(bucket, region, ?endpoint, "Created S3 store");
        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: bucket.to_string(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

/// Bodies above this size go up as a multipart upload, one part at a time.
pub const MULTIPART_PART_SIZE: usize = 8 * 1024 * 1024;

/// Byte ranges of each part. Every part is `part_size` long except the last.
fn part_ranges(len: usize, part_size: usize) -> Vec<Range<usize>> {
    (0..len)
        .step_by(part_size.max(1))
        .map(|start| start..(start + part_size).min(len))
        .collect()
}

fn transfer_error(key: &str, operation: &str, error: impl Error) -> PickerError {
    let detail = DisplayErrorContext(error).to_string();
    warn!(%key, operation, error = %detail, "S3 request failed");
    PickerError::Transfer(detail)
}

struct Target {
    client: Client,
    bucket: String,
    key: String,
}

impl Target {
    async fn put_single(&self, request: PutObjectRequest, acl: ObjectCannedAcl) -> PickerResult<()> {
        let mut put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .acl(acl)
            .content_type(&request.content_type)
            .body(ByteStream::from(request.body));
        if let Some(Encryption::Aes256) = request.encryption {
            put = put.server_side_encryption(ServerSideEncryption::Aes256);
        }
        put.send()
            .await
            .map_err(|e| transfer_error(&self.key, "PutObject", e))?;
        Ok(())
    }

    async fn put_multipart(
        &self,
        request: PutObjectRequest,
        acl: ObjectCannedAcl,
        progress: &ProgressSink,
    ) -> PickerResult<()> {
        let encryption = request
            .encryption
            .map(|Encryption::Aes256| ServerSideEncryption::Aes256);
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .acl(acl)
            .content_type(&request.content_type)
            .set_server_side_encryption(encryption)
            .send()
            .await
            .map_err(|e| transfer_error(&self.key, "CreateMultipartUpload", e))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| PickerError::Transfer("multipart upload has no id".to_string()))?
            .to_string();

        match self.upload_parts(&upload_id, &request.body, progress).await {
            Ok(()) => Ok(()),
            Err(error) => {
                if let Err(e) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(&self.key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(key = %self.key, error = %DisplayErrorContext(e), "Abort of multipart upload failed");
                }
                Err(error)
            }
        }
    }

    async fn upload_parts(
        &self,
        upload_id: &str,
        body: &Bytes,
        progress: &ProgressSink,
    ) -> PickerResult<()> {
        let total = body.len() as u64;
        let ranges = part_ranges(body.len(), MULTIPART_PART_SIZE);
        let mut parts = Vec::with_capacity(ranges.len());

        for (number, range) in (1..).zip(ranges) {
            let end = range.end as u64;
            let out = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(&self.key)
                .upload_id(upload_id)
                .part_number(number)
                .body(ByteStream::from(body.slice(range)))
                .send()
                .await
                .map_err(|e| transfer_error(&self.key, "UploadPart", e))?;
            parts.push(
                CompletedPart::builder()
                    .set_e_tag(out.e_tag().map(str::to_string))
                    .part_number(number)
                    .build(),
            );
            debug!(key = %self.key, part = number, loaded = end, total, "Uploaded part");
            progress.report(end, total);
        }

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| transfer_error(&self.key, "CompleteMultipartUpload", e))?;
        Ok(())
    }
}

impl ObjectStore for S3Store {
    /// Small bodies go up in one `PutObject` and report only start and
    /// finish. Bodies above [`MULTIPART_PART_SIZE`] report after each part.
    fn put_object(
        &self,
        request: PutObjectRequest,
        progress: ProgressSink,
    ) -> impl Future<Output = PickerResult<()>> + Send {
        let target = Target {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            key: request.key.clone(),
        };

        async move {
            let total = request.body.len() as u64;
            progress.report(0, total);

            let acl = match request.acl {
                ObjectAcl::Private => ObjectCannedAcl::Private,
                ObjectAcl::PublicRead => ObjectCannedAcl::PublicRead,
            };

            if request.body.len() > MULTIPART_PART_SIZE {
                target.put_multipart(request, acl, &progress).await?;
            } else {
                target.put_single(request, acl).await?;
                progress.report(total, total);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_long_lived_keys_rejected() {
        let creds = SessionCredentials {
            access_key_id: "AKIA".into(),
            secret_access_key: "secret".into(),
            session_token: None,
            expires_at: None,
        };
        let err = creds.check(Utc::now()).unwrap_err();
        assert!(err.to_string().contains("session token"));
    }

    #[test]
    fn test_expired_credentials_rejected() {
        let now = Utc::now();
        let creds = SessionCredentials::new("ASIA", "secret", "token", now - Duration::minutes(1));
        assert!(matches!(creds.check(now), Err(PickerError::Configuration(_))));

        let creds = SessionCredentials::new("ASIA", "secret", "token", now + Duration::minutes(15));
        assert!(creds.check(now).is_ok());
    }

    #[test]
    fn test_part_ranges_cover_body() {
        let ranges = part_ranges(25, 10);
        assert_eq!(ranges, vec![0..10, 10..20, 20..25]);

        assert_eq!(part_ranges(20, 10), vec![0..10, 10..20]);
        assert!(part_ranges(0, 10).is_empty());
    }

    #[test]
    fn test_large_body_splits_into_minimum_sized_parts() {
        let len = 2 * MULTIPART_PART_SIZE + 1;
        let ranges = part_ranges(len, MULTIPART_PART_SIZE);
        assert_eq!(ranges.len(), 3);
        // S3 refuses parts under 5 MiB except the last one
        assert!(ranges[..2].iter().all(|r| r.len() >= 5 * 1024 * 1024));
        assert_eq!(ranges.last().map(|r| r.end), Some(len));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = SessionCredentials::new("ASIA", "topsecret", "tok", Utc::now());
        let out = format!("{:?}", creds);
        assert!(!out.contains("topsecret"));
        assert!(!out.contains("tok\""));
        assert!(out.contains("ASIA"));
    }
}
