//! filedrop core library
//!
//! Validated, optionally cropped, direct-to-bucket file uploads.
//!
//! ## Overview
//!
//! A [`FilePicker`] accepts a selection of files, checks it against
//! [`FilePickerOptions`], uploads every file concurrently to an
//! [`ObjectStore`] and reports progress as [`PickerEvent`]s. With `crop`
//! enabled a single image is uploaded, checked against
//! [`ImageConstraints`], cropped by the caller and uploaded again; only the
//! cropped copy ends up in the [`UploadResult`].
//!
//! ## Core Principles
//!
//! - **Fail early**: selections are validated before any byte leaves the machine
//! - **Short-lived credentials**: the S3 store only accepts session credentials
//! - **One owner**: upload tasks report over a channel; only the picker mutates state
//!
//! ## Quick Start
//!
//! ```ignore
//! use filedrop_core::{FilePicker, FilePickerOptions, FileSelection, ImageConstraints, MemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = FilePickerOptions::new()
//!         .allow_multiple(true)
//!         .allowed_mimes(["image/*"]);
//!     let mut picker = FilePicker::new(MemoryStore::new(), "media/uploads", options, ImageConstraints::new())?
//!         .on_complete(|result| println!("uploaded {:?}", result.urls));
//!
//!     let selection = FileSelection::from_paths(&["a.png", "b.png"]).await?;
//!     picker.select(selection).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crop;
pub mod decode;
pub mod error;
pub mod logging;
pub mod options;
pub mod orchestrator;
pub mod session;
pub mod store;
pub mod types;
pub mod validator;

// Re-exports
pub use config::{PickerConfig, StoreConfig};
pub use crop::{CropArea, CropMode, CropWorkflow, DerivedBlob, EditParams};
pub use decode::DecodedImage;
pub use error::{PickerError, PickerResult};
pub use options::{FilePickerOptions, ImageConstraints};
pub use orchestrator::{FilePicker, PickerEvent, PickerState};
pub use session::UploadSession;
pub use store::{MemoryStore, ObjectLocation, ObjectStore, S3Store, SessionCredentials};
pub use types::*;
