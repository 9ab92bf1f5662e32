//! Per-selection upload bookkeeping.
//!
//! An [`UploadSession`] is owned by exactly one picker and mutated only by
//! its event loop, so no locking is involved. Every vector is index-aligned
//! with the selection that started the session.

use crate::error::{PickerError, PickerResult};
use crate::types::{BlobDescriptor, FileSelection, UploadResult};

#[derive(Debug, Clone, Default)]
pub struct UploadSession {
    progress: Vec<u8>,
    sizes: Vec<u64>,
    urls: Vec<Option<String>>,
    blobs: Vec<Option<BlobDescriptor>>,
    total_size: u64,
    files_processed: usize,
    upload_in_progress: bool,
    crop_done: bool,
}

/// `round(loaded / total * 100)`, clamped to 100. An empty body counts as done.
pub fn percent(loaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (loaded as f64 / total as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

impl UploadSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a fresh selection.
    ///
    /// When no crop is requested the crop step counts as already done.
    pub fn begin(&mut self, selection: &FileSelection, crop_requested: bool) {
        let n = selection.len();
        self.progress = vec![0; n];
        self.sizes = selection.iter().map(|f| f.size).collect();
        self.urls = vec![None; n];
        self.blobs = vec![None; n];
        self.total_size = selection.total_size();
        self.files_processed = 0;
        self.upload_in_progress = false;
        self.crop_done = !crop_requested;
    }

    /// Re-arm slot 0 for a derived (cropped) blob of `size` bytes.
    ///
    /// The previous URL stays in place until the new upload succeeds.
    pub fn begin_derived(&mut self, size: u64) {
        self.progress = vec![0];
        self.sizes = vec![size];
        self.urls.truncate(1);
        self.urls.resize(1, None);
        self.blobs = vec![None];
        self.total_size = size;
        self.files_processed = 0;
    }

    /// Clear the processed counter and descriptors ahead of the crop step.
    pub fn prepare_for_crop(&mut self) {
        self.files_processed = 0;
        self.blobs.iter_mut().for_each(|b| *b = None);
    }

    /// Drop everything.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Update the percentage for one file and return it.
    pub fn record_progress(&mut self, index: usize, loaded: u64, total: u64) -> Option<u8> {
        let slot = self.progress.get_mut(index)?;
        let pct = percent(loaded, total);
        *slot = pct;
        Some(pct)
    }

    /// Record a finished upload and return the new processed count.
    pub fn record_success(
        &mut self,
        index: usize,
        url: String,
        descriptor: BlobDescriptor,
    ) -> PickerResult<usize> {
        if index >= self.urls.len() {
            return Err(PickerError::InvalidOperation(format!(
                "upload index {} outside selection of {}",
                index,
                self.urls.len()
            )));
        }
        self.urls[index] = Some(url);
        self.blobs[index] = Some(descriptor);
        self.progress[index] = 100;
        self.files_processed += 1;
        Ok(self.files_processed)
    }

    /// True once every file in the selection has succeeded.
    pub fn is_complete(&self) -> bool {
        !self.urls.is_empty() && self.files_processed == self.urls.len()
    }

    pub fn set_upload_in_progress(&mut self, in_progress: bool) {
        self.upload_in_progress = in_progress;
    }

    pub fn is_upload_in_progress(&self) -> bool {
        self.upload_in_progress
    }

    pub fn mark_crop_done(&mut self) {
        self.crop_done = true;
    }

    pub fn crop_done(&self) -> bool {
        self.crop_done
    }

    pub fn files_processed(&self) -> usize {
        self.files_processed
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn progress(&self, index: usize) -> Option<u8> {
        self.progress.get(index).copied()
    }

    pub fn all_progress(&self) -> &[u8] {
        &self.progress
    }

    /// URL recorded for `index`, if its upload succeeded.
    pub fn url(&self, index: usize) -> Option<&str> {
        self.urls.get(index).and_then(|u| u.as_deref())
    }

    /// Aggregate percentage, weighted by file size.
    pub fn total_progress(&self) -> u8 {
        if self.total_size == 0 {
            return if self.is_complete() { 100 } else { 0 };
        }
        let loaded: f64 = self
            .progress
            .iter()
            .zip(&self.sizes)
            .map(|(pct, size)| *pct as f64 / 100.0 * *size as f64)
            .sum();
        percent(loaded.round() as u64, self.total_size)
    }

    /// Assemble the final result. Fails if any slot is still empty.
    pub fn result(&self) -> PickerResult<UploadResult> {
        let urls = self
            .urls
            .iter()
            .cloned()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| PickerError::InvalidOperation("upload not finished".to_string()))?;
        let blobs = self
            .blobs
            .iter()
            .cloned()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| PickerError::InvalidOperation("upload not finished".to_string()))?;
        Ok(UploadResult { urls, blobs })
    }
}
