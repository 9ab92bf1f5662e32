//! Error types for filedrop

use thiserror::Error;

/// Message shown when a transfer to the object store fails.
pub const TRANSFER_FAILED_MESSAGE: &str = "Error uploading file, please try again";

/// Message shown when an image cannot be decoded.
pub const IMAGE_DECODE_MESSAGE: &str =
    "Something is wrong with the image file, please try to upload a different file.";

/// Main error type for picker operations.
///
/// `Validation`, `ImageDecode` and `Transfer` carry the exact text to show
/// in place of the drop target, so their `Display` has no prefix.
#[derive(Error, Debug)]
pub enum PickerError {
    /// Invalid option combination, raised at setup
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The selected files break one of the configured rules
    #[error("{0}")]
    Validation(String),

    /// An image file could not be decoded
    #[error("{0}")]
    ImageDecode(String),

    /// The object store rejected or failed a transfer
    #[error("{0}")]
    Transfer(String),

    /// Cropping or re-encoding an image failed
    #[error("Crop error: {0}")]
    Crop(String),

    /// Invalid operation for the current picker state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PickerError {
    /// Whether the user may simply pick again after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PickerError::Validation(_)
                | PickerError::ImageDecode(_)
                | PickerError::Transfer(_)
                | PickerError::Crop(_)
        )
    }
}

impl From<serde_json::Error> for PickerError {
    fn from(err: serde_json::Error) -> Self {
        PickerError::Serialization(err.to_string())
    }
}

/// Result type alias using PickerError
pub type PickerResult<T> = Result<T, PickerError>;
