//! Upload orchestrator
//!
//! [`FilePicker`] drives one selection at a time through an explicit state
//! machine:
//!
//! ```text
//! ┌──────┐ select ┌────────────┐ invalid ┌──────────┐
//! │ Idle │───────►│ Validating │────────►│ Rejected │
//! └──────┘        └─────┬──────┘         └──────────┘
//!                       │ valid
//!                       ▼
//!                 ┌───────────┐  all done, crop wanted  ┌──────────────┐
//!            ┌───►│ Uploading │────────────────────────►│ AwaitingCrop │
//!            │    └─────┬─────┘                         └──────┬───────┘
//!            │          │ all done                             │ confirm
//!            │          ▼                                      │
//!            │    ┌───────────┐                                │
//!            │    │ Completed │                                │
//!            │    └───────────┘                                │
//!            └─────────────────────────────────────────────────┘
//!
//! Uploading ── error ──► Failed        any running state ── cancel ──► Cancelled
//! ```
//!
//! Each file is uploaded by its own tokio task. Tasks never touch the
//! session; they send [`UploadEvent`]s over one channel and the picker's
//! loop applies them one at a time, counting completions rather than
//! relying on their order.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PickerConfig;
use crate::crop::{CropArea, CropMode, CropWorkflow};
use crate::decode::{decode_image_async, DecodedImage};
use crate::error::{PickerError, PickerResult, TRANSFER_FAILED_MESSAGE};
use crate::options::{FilePickerOptions, ImageConstraints};
use crate::session::UploadSession;
use crate::store::{
    unique_object_name, Encryption, ObjectAcl, ObjectLocation, ObjectStore, ProgressSink,
    PutObjectRequest, TransferProgress,
};
use crate::types::{now_millis, BlobDescriptor, FileSelection, SelectedFile, UploadResult};
use crate::validator::{check_selection_count, validate_image_size, validate_selection};

/// Buffered picker events per subscriber.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Where the picker is in its workflow.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PickerState {
    #[default]
    Idle,
    Validating,
    /// The selection or the image size broke a rule
    Rejected { message: String },
    Uploading,
    /// Uncropped image uploaded, waiting for a crop area
    AwaitingCrop,
    Completed,
    /// Decode or transfer failure
    Failed { message: String },
    Cancelled,
}

impl PickerState {
    /// Message to show in place of the drop target, if any.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            PickerState::Rejected { message } | PickerState::Failed { message } => Some(message),
            _ => None,
        }
    }
}

impl fmt::Display for PickerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PickerState::Idle => write!(f, "Idle"),
            PickerState::Validating => write!(f, "Validating"),
            PickerState::Rejected { message } => write!(f, "Rejected: {}", message),
            PickerState::Uploading => write!(f, "Uploading"),
            PickerState::AwaitingCrop => write!(f, "Awaiting crop"),
            PickerState::Completed => write!(f, "Completed"),
            PickerState::Failed { message } => write!(f, "Failed: {}", message),
            PickerState::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Notifications for whatever renders the picker.
#[derive(Debug, Clone, PartialEq)]
pub enum PickerEvent {
    SelectionAccepted { files: usize, total_size: u64 },
    Progress { index: usize, percent: u8 },
    FileUploaded { index: usize, url: String },
    CropRequested { source_url: String, width: u32, height: u32 },
    Completed(UploadResult),
    Failed { message: String },
    Cancelled,
    Reset,
}

/// Messages from upload tasks to the picker loop.
#[derive(Debug)]
enum UploadEvent {
    Progress {
        index: usize,
        progress: TransferProgress,
    },
    Decoded {
        index: usize,
        image: DecodedImage,
    },
    Uploaded {
        index: usize,
        url: String,
        blob: BlobDescriptor,
    },
    Failed {
        index: usize,
        error: PickerError,
    },
}

struct UploadJob {
    index: usize,
    key: String,
    url: String,
    file: SelectedFile,
}

/// Invoked once with the full result when a selection completes.
pub type CompletionCallback = Box<dyn FnMut(&UploadResult) + Send>;

/// Source of the millisecond timestamps used in object names.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Validates, uploads and optionally crops one selection at a time.
pub struct FilePicker<S: ObjectStore> {
    store: Arc<S>,
    location: ObjectLocation,
    options: FilePickerOptions,
    constraints: ImageConstraints,
    crop_mode: CropMode,
    state: PickerState,
    session: UploadSession,
    selection: FileSelection,
    decoded: Option<DecodedImage>,
    crop: Option<CropWorkflow>,
    result: Option<UploadResult>,
    event_tx: broadcast::Sender<PickerEvent>,
    on_complete: Option<CompletionCallback>,
    clock: Clock,
    cancel: CancellationToken,
}

impl<S: ObjectStore> fmt::Debug for FilePicker<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePicker")
            .field("location", &self.location)
            .field("options", &self.options)
            .field("state", &self.state)
            .field("session", &self.session)
            .finish()
    }
}

impl<S: ObjectStore> FilePicker<S> {
    /// Create a picker uploading into `bucket` (`name[/folders]`).
    ///
    /// Fails with [`PickerError::Configuration`] on conflicting options.
    pub fn new(
        store: S,
        bucket: &str,
        options: FilePickerOptions,
        constraints: ImageConstraints,
    ) -> PickerResult<Self> {
        let options = options.normalized();
        options.check(&constraints)?;
        if bucket.is_empty() {
            return Err(PickerError::Configuration("no bucket configured".to_string()));
        }

        let location = ObjectLocation::new(bucket, options.path.as_deref());
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            store: Arc::new(store),
            location,
            options,
            constraints,
            crop_mode: CropMode::default(),
            state: PickerState::Idle,
            session: UploadSession::new(),
            selection: FileSelection::default(),
            decoded: None,
            crop: None,
            result: None,
            event_tx,
            on_complete: None,
            clock: Arc::new(now_millis),
            cancel: CancellationToken::new(),
        })
    }

    /// Create a picker from loaded configuration.
    pub fn from_config(store: S, config: &PickerConfig) -> PickerResult<Self> {
        let picker = Self::new(
            store,
            &config.store.bucket,
            config.options.clone(),
            config.image,
        )?;
        Ok(picker.with_storage_domain(config.store.storage_domain.clone()))
    }

    pub fn with_storage_domain(mut self, domain: impl Into<String>) -> Self {
        self.location = self.location.with_domain(domain);
        self
    }

    pub fn with_crop_mode(mut self, mode: CropMode) -> Self {
        self.crop_mode = mode;
        self
    }

    /// Replace the timestamp source used for unique object names.
    pub fn with_clock(mut self, clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Register the completion callback.
    pub fn on_complete(mut self, callback: impl FnMut(&UploadResult) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Receive picker events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PickerEvent> {
        self.event_tx.subscribe()
    }

    /// Token that cancels the running selection.
    ///
    /// A cancelled token stays cancelled; fetch a new one after the next
    /// selection starts.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> &PickerState {
        &self.state
    }

    pub fn session(&self) -> &UploadSession {
        &self.session
    }

    pub fn options(&self) -> &FilePickerOptions {
        &self.options
    }

    pub fn location(&self) -> &ObjectLocation {
        &self.location
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Result of the last completed selection.
    pub fn result(&self) -> Option<&UploadResult> {
        self.result.as_ref()
    }

    pub fn crop_workflow(&self) -> Option<&CropWorkflow> {
        self.crop.as_ref()
    }

    pub fn crop_workflow_mut(&mut self) -> Option<&mut CropWorkflow> {
        self.crop.as_mut()
    }

    /// True while new selections are refused.
    pub fn is_busy(&self) -> bool {
        matches!(
            self.state,
            PickerState::Validating | PickerState::Uploading | PickerState::AwaitingCrop
        )
    }

    /// Validate and upload a new selection.
    ///
    /// Returns the state reached: `Completed`, or `AwaitingCrop` when a crop
    /// is requested. Recoverable failures come back as errors and leave the
    /// picker in `Rejected` or `Failed`, ready for another selection.
    pub async fn select(&mut self, selection: FileSelection) -> PickerResult<PickerState> {
        if self.is_busy() {
            return Err(PickerError::InvalidOperation(
                "an upload is already in progress".to_string(),
            ));
        }
        if selection.is_empty() {
            debug!("Ignoring empty selection");
            return Ok(self.state.clone());
        }
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }

        self.session.reset();
        self.result = None;
        self.crop = None;
        self.decoded = None;
        self.state = PickerState::Validating;

        let checked = check_selection_count(&selection, &self.options)
            .and_then(|_| validate_selection(&selection, &self.options));
        if let Err(error) = checked {
            return Err(self.reject(error));
        }

        self.session.begin(&selection, self.options.crop);
        info!(
            files = selection.len(),
            total_size = selection.total_size(),
            "Selection accepted"
        );
        self.emit(PickerEvent::SelectionAccepted {
            files: selection.len(),
            total_size: selection.total_size(),
        });

        let files = selection.iter().cloned().enumerate().collect();
        self.selection = selection;
        self.run_uploads(files).await
    }

    /// Select `area` (optionally scaled to `final_size`) and confirm it.
    pub async fn apply_crop(
        &mut self,
        area: CropArea,
        final_size: Option<(u32, u32)>,
    ) -> PickerResult<PickerState> {
        let workflow = self.crop.as_mut().ok_or_else(|| {
            PickerError::InvalidOperation("no crop step is pending".to_string())
        })?;
        workflow.select_area(area);
        if let Some((w, h)) = final_size {
            workflow.set_final_size(w, h);
        }
        self.confirm_crop().await
    }

    /// Rasterize the selected crop area and upload it in place of the original.
    pub async fn confirm_crop(&mut self) -> PickerResult<PickerState> {
        let workflow = match (&self.state, self.crop.as_ref()) {
            (PickerState::AwaitingCrop, Some(workflow)) => workflow,
            _ => {
                return Err(PickerError::InvalidOperation(
                    "no crop step is pending".to_string(),
                ))
            }
        };
        if !workflow.can_save() {
            return Err(PickerError::InvalidOperation(
                "select a crop area before saving".to_string(),
            ));
        }

        let derived = match workflow.confirm() {
            Ok(derived) => derived,
            Err(error) => return Err(self.fail(error)),
        };

        self.crop = None;
        self.decoded = None;
        self.session.mark_crop_done();
        self.session.begin_derived(derived.size());
        info!(
            width = derived.width,
            height = derived.height,
            size = derived.size(),
            "Uploading cropped image"
        );
        self.emit(PickerEvent::SelectionAccepted {
            files: 1,
            total_size: derived.size(),
        });

        let file = derived.into_selected_file();
        self.selection = FileSelection::single(file.clone());
        self.run_uploads(vec![(0, file)]).await
    }

    /// Dismiss the crop step.
    ///
    /// Standalone pickers return to `Idle`; modal pickers end in `Cancelled`.
    pub fn cancel_crop(&mut self) -> PickerResult<PickerState> {
        if self.state != PickerState::AwaitingCrop {
            return Err(PickerError::InvalidOperation(
                "no crop step is pending".to_string(),
            ));
        }
        match self.crop_mode {
            CropMode::Standalone => self.reset(),
            CropMode::Modal => self.enter_cancelled(),
        }
        Ok(self.state.clone())
    }

    /// Cancel whatever is running.
    ///
    /// In-flight uploads are abandoned by the running [`FilePicker::select`];
    /// a pending crop step is dismissed immediately.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        if self.state == PickerState::AwaitingCrop {
            self.enter_cancelled();
        }
    }

    /// Forget the current selection and return to `Idle`.
    pub fn reset(&mut self) {
        self.session.reset();
        self.selection = FileSelection::default();
        self.crop = None;
        self.decoded = None;
        self.result = None;
        self.state = PickerState::Idle;
        self.emit(PickerEvent::Reset);
    }

    async fn run_uploads(&mut self, files: Vec<(usize, SelectedFile)>) -> PickerResult<PickerState> {
        self.session.set_upload_in_progress(true);
        self.state = PickerState::Uploading;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tasks = JoinSet::new();
        for (index, file) in files {
            let name = unique_object_name((self.clock)(), &file.name);
            let job = UploadJob {
                index,
                key: self.location.key_for(&name),
                url: self.location.url_for(&name),
                file,
            };
            tasks.spawn(upload_file(self.store.clone(), job, tx.clone()));
        }
        drop(tx);

        let cancel = self.cancel.clone();
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    info!("Upload cancelled");
                    self.enter_cancelled();
                    return Ok(self.state.clone());
                }
                event = rx.recv() => event,
            };
            let Some(event) = event else { break };

            match event {
                UploadEvent::Progress { index, progress } => {
                    if let Some(percent) =
                        self.session.record_progress(index, progress.loaded, progress.total)
                    {
                        self.emit(PickerEvent::Progress { index, percent });
                    }
                }
                UploadEvent::Decoded { index, image } => {
                    debug!(index, width = image.width(), height = image.height(), "Decoded image");
                    if self.options.crop && !self.session.crop_done() {
                        self.decoded = Some(image);
                    }
                }
                UploadEvent::Uploaded { index, url, blob } => {
                    match self.session.record_success(index, url.clone(), blob) {
                        Ok(processed) => {
                            info!(index, %url, processed, "File uploaded");
                            self.emit(PickerEvent::FileUploaded { index, url });
                        }
                        Err(error) => {
                            tasks.abort_all();
                            return Err(self.fail(error));
                        }
                    }
                }
                UploadEvent::Failed { index, error } => {
                    warn!(index, %error, "Upload of file failed");
                    tasks.abort_all();
                    return Err(self.fail(error));
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                return Err(self.fail(PickerError::InvalidOperation(format!(
                    "upload task failed: {}",
                    e
                ))));
            }
        }

        if !self.session.is_complete() {
            return Err(self.fail(PickerError::InvalidOperation(
                "uploads ended before every file finished".to_string(),
            )));
        }
        self.finish_batch().await
    }

    async fn finish_batch(&mut self) -> PickerResult<PickerState> {
        if self.options.crop && !self.session.crop_done() {
            if self.selection.get(0).is_some_and(SelectedFile::is_image) {
                self.session.prepare_for_crop();
                return self.open_crop().await;
            }
            // Only images get a crop step.
            debug!("Skipping crop for non-image upload");
            self.session.mark_crop_done();
        }

        let result = match self.session.result() {
            Ok(result) => result,
            Err(error) => return Err(self.fail(error)),
        };
        self.session.set_upload_in_progress(false);
        if let Some(callback) = self.on_complete.as_mut() {
            callback(&result);
        }
        info!(files = result.len(), "Upload completed");
        self.emit(PickerEvent::Completed(result.clone()));
        self.result = Some(result);
        self.state = PickerState::Completed;
        Ok(self.state.clone())
    }

    async fn open_crop(&mut self) -> PickerResult<PickerState> {
        let (source_url, file) = match (self.session.url(0), self.selection.get(0)) {
            (Some(url), Some(file)) => (url.to_string(), file.clone()),
            _ => {
                return Err(self.fail(PickerError::InvalidOperation(
                    "crop requested without an uploaded image".to_string(),
                )))
            }
        };

        let decoded = match self.decoded.take() {
            Some(decoded) => decoded,
            None => match decode_image_async(file.body.clone(), file.mime.clone()).await {
                Ok(decoded) => decoded,
                Err(error) => return Err(self.fail(error)),
            },
        };

        let (width, height) = decoded.dimensions();
        if let Err(error) = validate_image_size(width, height, &self.constraints) {
            return Err(self.reject(error));
        }

        info!(%source_url, width, height, "Waiting for crop area");
        self.crop = Some(CropWorkflow::new(
            source_url.clone(),
            file.name,
            file.mime,
            decoded,
        ));
        self.state = PickerState::AwaitingCrop;
        self.emit(PickerEvent::CropRequested {
            source_url,
            width,
            height,
        });
        Ok(self.state.clone())
    }

    /// Selection or image refused: show the message and accept a new pick.
    fn reject(&mut self, error: PickerError) -> PickerError {
        let message = error.to_string();
        info!(%message, "Selection rejected");
        self.session.set_upload_in_progress(false);
        self.crop = None;
        self.decoded = None;
        self.state = PickerState::Rejected {
            message: message.clone(),
        };
        self.emit(PickerEvent::Failed { message });
        error
    }

    /// Decode or transfer failure. Transfer failures also mark the crop
    /// step done so a surrounding flow can close.
    fn fail(&mut self, error: PickerError) -> PickerError {
        let error = match error {
            PickerError::Transfer(detail) => {
                debug!(%detail, "Transfer failure detail");
                self.session.mark_crop_done();
                PickerError::Transfer(TRANSFER_FAILED_MESSAGE.to_string())
            }
            other => other,
        };
        let message = error.to_string();
        warn!(%message, "Upload failed");
        self.session.set_upload_in_progress(false);
        self.crop = None;
        self.decoded = None;
        self.state = PickerState::Failed {
            message: message.clone(),
        };
        self.emit(PickerEvent::Failed { message });
        error
    }

    fn enter_cancelled(&mut self) {
        self.session.set_upload_in_progress(false);
        self.crop = None;
        self.decoded = None;
        self.state = PickerState::Cancelled;
        self.emit(PickerEvent::Cancelled);
    }

    fn emit(&self, event: PickerEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

async fn upload_file<S: ObjectStore>(
    store: Arc<S>,
    job: UploadJob,
    tx: mpsc::UnboundedSender<UploadEvent>,
) {
    let UploadJob {
        index,
        key,
        url,
        file,
    } = job;

    if file.is_image() {
        match decode_image_async(file.body.clone(), file.mime.clone()).await {
            Ok(image) => {
                let _ = tx.send(UploadEvent::Decoded { index, image });
            }
            Err(error) => {
                let _ = tx.send(UploadEvent::Failed { index, error });
                return;
            }
        }
    }

    let request = PutObjectRequest {
        key,
        acl: ObjectAcl::PublicRead,
        content_type: file.mime.clone(),
        body: file.body.clone(),
        encryption: Some(Encryption::Aes256),
    };
    let progress = {
        let tx = tx.clone();
        ProgressSink::new(move |progress| {
            let _ = tx.send(UploadEvent::Progress { index, progress });
        })
    };

    debug!(index, key = %request.key, size = file.size, "Starting PUT");
    let event = match store.put_object(request, progress).await {
        Ok(()) => UploadEvent::Uploaded {
            index,
            url,
            blob: BlobDescriptor {
                filename: file.name,
                size: file.size,
            },
        },
        Err(error) => UploadEvent::Failed { index, error },
    };
    let _ = tx.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn picker(options: FilePickerOptions) -> FilePicker<MemoryStore> {
        FilePicker::new(MemoryStore::new(), "media", options, ImageConstraints::new())
            .unwrap()
            .with_clock(|| 1_700_000_000_000)
    }

    #[test]
    fn test_conflicting_options_fail_at_setup() {
        let err = FilePicker::new(
            MemoryStore::new(),
            "media",
            FilePickerOptions::new().crop(true).allow_multiple(true),
            ImageConstraints::new(),
        )
        .unwrap_err();
        assert!(matches!(err, PickerError::Configuration(_)));
    }

    #[test]
    fn test_missing_bucket_fails_at_setup() {
        let err = FilePicker::new(
            MemoryStore::new(),
            "",
            FilePickerOptions::new(),
            ImageConstraints::new(),
        )
        .unwrap_err();
        assert!(matches!(err, PickerError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_single_file_upload() {
        let mut picker = picker(FilePickerOptions::new().path("docs/"));
        let selection = FileSelection::single(SelectedFile::new("a b.txt", "text/plain", b"hi".to_vec()));

        let state = picker.select(selection).await.unwrap();
        assert_eq!(state, PickerState::Completed);

        let result = picker.result().unwrap();
        assert_eq!(
            result.urls,
            vec!["https://media.s3.amazonaws.com/docs/1700000000000-a%20b.txt"]
        );
        assert_eq!(result.blobs[0].filename, "a b.txt");
        assert!(picker.store().get("docs/1700000000000-a b.txt").is_some());
        assert!(!picker.session().is_upload_in_progress());
    }

    #[tokio::test]
    async fn test_empty_selection_ignored() {
        let mut picker = picker(FilePickerOptions::new());
        let state = picker.select(FileSelection::default()).await.unwrap();
        assert_eq!(state, PickerState::Idle);
    }

    #[tokio::test]
    async fn test_rejected_selection_keeps_picker_usable() {
        let mut picker = picker(FilePickerOptions::new());
        let err = picker
            .select(FileSelection::single(SelectedFile::new("e.txt", "text/plain", Vec::new())))
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(picker.state().error_message(), Some("Selected file is empty"));

        let state = picker
            .select(FileSelection::single(SelectedFile::new("f.txt", "text/plain", b"x".to_vec())))
            .await
            .unwrap();
        assert_eq!(state, PickerState::Completed);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(PickerState::AwaitingCrop.to_string(), "Awaiting crop");
        assert_eq!(
            PickerState::Failed { message: "boom".into() }.to_string(),
            "Failed: boom"
        );
    }
}
