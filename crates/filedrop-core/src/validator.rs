//! Selection and image-size validation.
//!
//! Pure functions: each returns the first violation found as a
//! [`PickerError::Validation`] carrying the message to show the user.
//! Rules run in a fixed order and each rule is applied to every file
//! before the next rule is tried.

use crate::error::{PickerError, PickerResult};
use crate::options::{FilePickerOptions, ImageConstraints};
use crate::types::{FileSelection, SelectedFile};

/// Shown when several files are picked without `allow_multiple`.
pub const MULTIPLE_NOT_ALLOWED: &str = "Multiple file selection is not allowed";

/// Shown when any selected file has no content.
pub const EMPTY_FILE: &str = "Selected file is empty";

/// A configured mime rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MimePattern {
    /// Full comparison, e.g. `image/png`
    Exact(String),
    /// `type/*`, stored as the `type/` prefix
    Family(String),
}

impl MimePattern {
    pub fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) if prefix.ends_with('/') => MimePattern::Family(prefix.to_string()),
            _ => MimePattern::Exact(pattern.to_string()),
        }
    }

    pub fn matches(&self, mime: &str) -> bool {
        match self {
            MimePattern::Exact(m) => m == mime,
            MimePattern::Family(prefix) => mime.starts_with(prefix.as_str()),
        }
    }
}

/// Refuse multi-file selections unless the options allow them.
pub fn check_selection_count(
    selection: &FileSelection,
    options: &FilePickerOptions,
) -> PickerResult<()> {
    if selection.len() > 1 && !options.allow_multiple {
        return Err(PickerError::Validation(MULTIPLE_NOT_ALLOWED.to_string()));
    }
    Ok(())
}

/// Check every file against the picker options.
pub fn validate_selection(
    selection: &FileSelection,
    options: &FilePickerOptions,
) -> PickerResult<()> {
    if selection.iter().any(|f| f.size == 0) {
        return Err(PickerError::Validation(EMPTY_FILE.to_string()));
    }

    if let Some(allowed) = &options.allowed_types {
        if let Some(file) = selection
            .iter()
            .find(|f| !allowed.iter().any(|t| t == f.extension()))
        {
            return Err(PickerError::Validation(format!(
                "Selected file extension ({}) is not allowed. Allowed types are: {}",
                file.extension(),
                allowed.join(",")
            )));
        }
    }

    if let Some(allowed) = &options.allowed_mimes {
        let patterns: Vec<MimePattern> = allowed.iter().map(|m| MimePattern::parse(m)).collect();
        if let Some(file) = selection
            .iter()
            .find(|f| !patterns.iter().any(|p| p.matches(&f.mime)))
        {
            return Err(PickerError::Validation(format!(
                "Selected file type ({}) is not allowed. Allowed mime types are: {}",
                file.display_type(),
                allowed.join(",")
            )));
        }
    }

    if let Some(excluded) = &options.excluded_mimes {
        if let Some(file) = selection
            .iter()
            .find(|f| excluded.iter().any(|m| *m == f.mime))
        {
            return Err(PickerError::Validation(format!(
                "Selected file type ({}) is not allowed. The following mime types are not allowed: {}",
                file.display_type(),
                excluded.join(",")
            )));
        }
    }

    if let Some(max) = options.max_filename_length.filter(|m| *m > 0) {
        if let Some(file) = selection.iter().find(|f| name_length(f) > max) {
            return Err(PickerError::Validation(format!(
                "Selected file name is {} characters long. Maximum file name length allowed is {} characters.",
                name_length(file),
                max
            )));
        }
    }

    Ok(())
}

/// Compare natural image dimensions against the configured bounds.
pub fn validate_image_size(
    width: u32,
    height: u32,
    constraints: &ImageConstraints,
) -> PickerResult<()> {
    let below = |bound: Option<u32>, actual: u32| bound.is_some_and(|b| b > 0 && b > actual);
    let above = |bound: Option<u32>, actual: u32| bound.is_some_and(|b| b > 0 && b < actual);

    if below(constraints.min_width, width) || below(constraints.min_height, height) {
        return Err(PickerError::Validation(format!(
            "Image size is too small ({}x{}). Please select an image that is at least {} pixels wide and at least {} pixels tall.",
            width,
            height,
            describe_bound(constraints.min_width),
            describe_bound(constraints.min_height)
        )));
    }

    if above(constraints.max_width, width) || above(constraints.max_height, height) {
        return Err(PickerError::Validation(format!(
            "Image size is too large ({}x{}). Please select an image with a maximum width of {} pixels and a maximum height of {} pixels.",
            width,
            height,
            describe_bound(constraints.max_width),
            describe_bound(constraints.max_height)
        )));
    }

    Ok(())
}

fn name_length(file: &SelectedFile) -> usize {
    file.name.chars().count()
}

fn describe_bound(bound: Option<u32>) -> String {
    match bound {
        Some(b) if b > 0 => b.to_string(),
        _ => "any number of".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, mime: &str, size: usize) -> SelectedFile {
        SelectedFile::new(name, mime, vec![7u8; size])
    }

    #[test]
    fn test_multiple_not_allowed() {
        let selection = FileSelection::new(vec![file("a.png", "image/png", 1), file("b.png", "image/png", 1)]);

        let err = check_selection_count(&selection, &FilePickerOptions::new()).unwrap_err();
        assert_eq!(err.to_string(), MULTIPLE_NOT_ALLOWED);

        let opts = FilePickerOptions::new().allow_multiple(true);
        assert!(check_selection_count(&selection, &opts).is_ok());
    }

    #[test]
    fn test_empty_file_checked_first() {
        // Would also fail the extension rule, but emptiness wins
        let selection = FileSelection::single(file("a.exe", "application/x-msdownload", 0));
        let opts = FilePickerOptions::new().allowed_types(["png"]);

        let err = validate_selection(&selection, &opts).unwrap_err();
        assert_eq!(err.to_string(), EMPTY_FILE);
    }

    #[test]
    fn test_extension_rule() {
        let opts = FilePickerOptions::new().allowed_types(["png", "jpg"]);

        let ok = FileSelection::single(file("a.png", "image/png", 3));
        assert!(validate_selection(&ok, &opts).is_ok());

        let bad = FileSelection::single(file("a.gif", "image/gif", 3));
        let err = validate_selection(&bad, &opts).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Selected file extension (gif) is not allowed. Allowed types are: png,jpg"
        );
    }

    #[test]
    fn test_mime_family_wildcard() {
        let opts = FilePickerOptions::new().allowed_mimes(["image/*"]);

        let ok = FileSelection::single(file("a.webp", "image/webp", 3));
        assert!(validate_selection(&ok, &opts).is_ok());

        let bad = FileSelection::single(file("a.pdf", "application/pdf", 3));
        let err = validate_selection(&bad, &opts).unwrap_err();
        assert!(err.to_string().contains("(application/pdf)"));
    }

    #[test]
    fn test_mime_without_type_reports_extension() {
        let opts = FilePickerOptions::new().allowed_mimes(["image/png"]);
        let bad = FileSelection::single(file("model.stl", "", 3));

        let err = validate_selection(&bad, &opts).unwrap_err();
        assert!(err.to_string().starts_with("Selected file type (stl)"));
    }

    #[test]
    fn test_excluded_mimes() {
        let opts = FilePickerOptions::new().excluded_mimes(["image/gif"]);

        let bad = FileSelection::single(file("a.gif", "image/gif", 3));
        let err = validate_selection(&bad, &opts).unwrap_err();
        assert!(err.to_string().contains("The following mime types are not allowed: image/gif"));

        let ok = FileSelection::single(file("a.png", "image/png", 3));
        assert!(validate_selection(&ok, &opts).is_ok());
    }

    #[test]
    fn test_filename_length() {
        let opts = FilePickerOptions::new().max_filename_length(8);

        let ok = FileSelection::single(file("abcd.png", "image/png", 1));
        assert!(validate_selection(&ok, &opts).is_ok());

        let bad = FileSelection::single(file("abcde.png", "image/png", 1));
        let err = validate_selection(&bad, &opts).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Selected file name is 9 characters long. Maximum file name length allowed is 8 characters."
        );
    }

    #[test]
    fn test_image_size_boundaries() {
        let constraints = ImageConstraints::new().min(1920, 350);

        assert!(validate_image_size(1920, 350, &constraints).is_ok());

        let err = validate_image_size(1919, 350, &constraints).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Image size is too small (1919x350). Please select an image that is at least 1920 pixels wide and at least 350 pixels tall."
        );
    }

    #[test]
    fn test_image_too_large_quotes_max_bounds() {
        let constraints = ImageConstraints::new().max(800, 600);

        let err = validate_image_size(801, 10, &constraints).unwrap_err();
        assert!(err.to_string().contains("(801x10)"));
        assert!(err.to_string().contains("maximum width of 800 pixels"));
        assert!(err.to_string().contains("maximum height of 600 pixels"));
    }

    #[test]
    fn test_mime_pattern_parse() {
        assert_eq!(MimePattern::parse("image/*"), MimePattern::Family("image/".into()));
        assert_eq!(MimePattern::parse("image/png"), MimePattern::Exact("image/png".into()));
        assert_eq!(MimePattern::parse("*"), MimePattern::Exact("*".into()));
    }
}
