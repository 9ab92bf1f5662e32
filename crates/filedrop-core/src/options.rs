//! Picker configuration: selection rules and image size constraints.

use serde::{Deserialize, Serialize};

use crate::error::{PickerError, PickerResult};

/// Rules applied to every selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilePickerOptions {
    /// Accept more than one file per selection
    pub allow_multiple: bool,
    /// Ask for a crop area after the first upload (single images only)
    pub crop: bool,
    /// Folder inside the bucket to upload into
    pub path: Option<String>,
    /// Allowed file extensions, without the dot
    pub allowed_types: Option<Vec<String>>,
    /// Allowed mime types; `type/*` matches a whole family
    pub allowed_mimes: Option<Vec<String>>,
    /// Mime types that are always refused
    pub excluded_mimes: Option<Vec<String>>,
    /// Longest accepted file name, in characters
    pub max_filename_length: Option<usize>,
}

impl FilePickerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_multiple(mut self, allow: bool) -> Self {
        self.allow_multiple = allow;
        self
    }

    pub fn crop(mut self, crop: bool) -> Self {
        self.crop = crop;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn allowed_types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.allowed_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    pub fn allowed_mimes<I, T>(mut self, mimes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.allowed_mimes = Some(mimes.into_iter().map(Into::into).collect());
        self
    }

    pub fn excluded_mimes<I, T>(mut self, mimes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.excluded_mimes = Some(mimes.into_iter().map(Into::into).collect());
        self
    }

    pub fn max_filename_length(mut self, max: usize) -> Self {
        self.max_filename_length = Some(max);
        self
    }

    /// Strip a trailing slash from `path` and drop it entirely if empty.
    pub fn normalized(mut self) -> Self {
        self.path = self.path.and_then(|p| {
            let trimmed = p.strip_suffix('/').unwrap_or(&p);
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        });
        self
    }

    /// Reject option combinations that cannot work together.
    pub fn check(&self, constraints: &ImageConstraints) -> PickerResult<()> {
        if self.allow_multiple && self.crop {
            return Err(PickerError::Configuration(
                "Can't provide both crop=true and allowMultiple=true at the same time.".to_string(),
            ));
        }

        if !self.crop && !constraints.is_empty() {
            return Err(PickerError::Configuration(
                "Can't provide image constraints without setting crop to true.".to_string(),
            ));
        }

        Ok(())
    }
}

/// Pixel bounds checked against the source image before cropping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConstraints {
    pub min_width: Option<u32>,
    pub min_height: Option<u32>,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
}

impl ImageConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min(mut self, width: u32, height: u32) -> Self {
        self.min_width = Some(width);
        self.min_height = Some(height);
        self
    }

    pub fn max(mut self, width: u32, height: u32) -> Self {
        self.max_width = Some(width);
        self.max_height = Some(height);
        self
    }

    /// True when no bound is set. A bound of zero counts as unset.
    pub fn is_empty(&self) -> bool {
        [self.min_width, self.min_height, self.max_width, self.max_height]
            .iter()
            .all(|b| b.unwrap_or(0) == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_stripped() {
        let opts = FilePickerOptions::new().path("avatars/").normalized();
        assert_eq!(opts.path.as_deref(), Some("avatars"));

        let opts = FilePickerOptions::new().path("a/b").normalized();
        assert_eq!(opts.path.as_deref(), Some("a/b"));

        let opts = FilePickerOptions::new().path("/").normalized();
        assert_eq!(opts.path, None);
    }

    #[test]
    fn test_crop_and_multiple_rejected() {
        let opts = FilePickerOptions::new().allow_multiple(true).crop(true);
        let err = opts.check(&ImageConstraints::new()).unwrap_err();
        assert!(matches!(err, PickerError::Configuration(_)));
        assert!(err.to_string().contains("allowMultiple"));
    }

    #[test]
    fn test_constraints_require_crop() {
        let constraints = ImageConstraints::new().min(100, 100);

        let err = FilePickerOptions::new().check(&constraints).unwrap_err();
        assert!(matches!(err, PickerError::Configuration(_)));

        assert!(FilePickerOptions::new().crop(true).check(&constraints).is_ok());
    }

    #[test]
    fn test_zero_bounds_count_as_empty() {
        let constraints = ImageConstraints {
            min_width: Some(0),
            ..Default::default()
        };
        assert!(constraints.is_empty());
        assert!(FilePickerOptions::new().check(&constraints).is_ok());
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let opts: FilePickerOptions =
            serde_json::from_str(r#"{"crop": true, "allowed_mimes": ["image/*"]}"#).unwrap();
        assert!(opts.crop);
        assert!(!opts.allow_multiple);
        assert_eq!(opts.allowed_mimes, Some(vec!["image/*".to_string()]));
    }
}
