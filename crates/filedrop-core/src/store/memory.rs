//! In-memory object store for tests and dry runs.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;

use super::{Encryption, ObjectAcl, ObjectStore, ProgressSink, PutObjectRequest};
use crate::error::{PickerError, PickerResult};

/// Progress is reported once per chunk of this many bytes.
const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// An object held by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: String,
    pub acl: ObjectAcl,
    pub encryption: Option<Encryption>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    objects: HashMap<String, StoredObject>,
    failing: Vec<String>,
    delays: Vec<(String, Duration)>,
    put_count: usize,
}

/// Object store backed by a shared map.
///
/// Clones share the same objects. Keys matching a registered pattern can be
/// made to fail or to complete late, which is how tests exercise error
/// handling and out-of-order completion.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
    chunk_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryInner::default())),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Fail every PUT whose key contains `pattern`.
    pub fn fail_when_key_contains(&self, pattern: impl Into<String>) {
        self.inner.lock().failing.push(pattern.into());
    }

    /// Stop failing keys.
    pub fn clear_failures(&self) {
        self.inner.lock().failing.clear();
    }

    /// Hold back completion of PUTs whose key contains `pattern`.
    pub fn delay_when_key_contains(&self, pattern: impl Into<String>, delay: Duration) {
        self.inner.lock().delays.push((pattern.into(), delay));
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.inner.lock().objects.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.lock().objects.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.inner.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of PUTs attempted, including failed ones.
    pub fn put_count(&self) -> usize {
        self.inner.lock().put_count
    }
}

impl ObjectStore for MemoryStore {
    fn put_object(
        &self,
        request: PutObjectRequest,
        progress: ProgressSink,
    ) -> impl Future<Output = PickerResult<()>> + Send {
        let inner = self.inner.clone();
        let chunk_size = self.chunk_size;

        async move {
            let (fails, delay) = {
                let mut guard = inner.lock();
                guard.put_count += 1;
                let fails = guard.failing.iter().any(|p| request.key.contains(p.as_str()));
                let delay = guard
                    .delays
                    .iter()
                    .find(|(p, _)| request.key.contains(p.as_str()))
                    .map(|(_, d)| *d);
                (fails, delay)
            };

            let total = request.body.len() as u64;
            if total == 0 {
                progress.report(0, 0);
            }
            let mut loaded = 0u64;
            while loaded < total {
                loaded = (loaded + chunk_size as u64).min(total);
                progress.report(loaded, total);
                tokio::task::yield_now().await;
            }

            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            if fails {
                debug!(key = %request.key, "Simulated PUT failure");
                return Err(PickerError::Transfer(format!(
                    "simulated failure for {}",
                    request.key
                )));
            }

            debug!(key = %request.key, bytes = total, "Stored object in memory");
            inner.lock().objects.insert(
                request.key,
                StoredObject {
                    body: request.body,
                    content_type: request.content_type,
                    acl: request.acl,
                    encryption: request.encryption,
                },
            );
            Ok(())
        }
    }
}
