//! Input validation utilities

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use validator::ValidationError;

static IMAGE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-z0-9]+(?:[._-][a-z0-9]+)*(?::[0-9]+)?(?:/[a-z0-9]+(?:[._-][a-z0-9]+)*)*(?::[A-Za-z0-9_][A-Za-z0-9_.-]{0,127})?(?:@sha256:[a-f0-9]{64})?$",
    )
    .expect("image reference pattern is valid")
});

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err
}

/// Validate a container image reference (`[registry[:port]/]name[:tag][@digest]`)
pub fn validate_image_ref(image: &str) -> Result<(), ValidationError> {
    if IMAGE_REF.is_match(image) {
        Ok(())
    } else {
        Err(invalid("image_ref", "Invalid container image reference"))
    }
}

/// Validate a dataset reference: an absolute host path without traversal
pub fn validate_dataset_ref(dataset: &str) -> Result<(), ValidationError> {
    if !dataset.starts_with('/') {
        return Err(invalid("dataset_ref", "Dataset reference must be an absolute path"));
    }
    if dataset.split('/').any(|segment| segment == "..") {
        return Err(invalid("dataset_ref", "Dataset reference must not contain '..'"));
    }
    if dataset.contains(':') || dataset.chars().any(char::is_control) {
        return Err(invalid("dataset_ref", "Dataset reference contains invalid characters"));
    }
    Ok(())
}

/// Sanitize string input (remove control characters, trim whitespace)
pub fn sanitize_string(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Truncate to at most `max_bytes`, cutting on a char boundary
pub fn truncate_utf8(input: &str, max_bytes: usize) -> &str {
    if input.len() <= max_bytes {
        return input;
    }
    let mut end = max_bytes;
    while !input.is_char_boundary(end) {
        end -= 1;
    }
    &input[..end]
}
