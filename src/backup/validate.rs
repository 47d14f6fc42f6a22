//! Validation functions for configuration values.
//!
//! Provides custom validation functions for directories, tags and bucket
//! names used by `validator` derives.

use sanitize_filename::{is_sanitized, sanitize};
use validator::ValidationError;

use std::path::Path;

const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

pub fn validate_tag<S: AsRef<str>>(tag: S) -> Result<(), ValidationError> {
    let tag = tag.as_ref();
    if tag.is_empty() {
        return Err(ValidationError::new("InvalidTag").with_message("tag must not be empty".into()));
    }
    if !is_sanitized(tag) {
        return Err(ValidationError::new("InvalidTag").with_message(
            format!("Invalid tag, try sanitizing like {:?}", sanitize(tag)).into(),
        ));
    }

    Ok(())
}

pub fn validate_dir_exist_or_created<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ValidationError::new("InvalidDirectory")
                .with_message(format!("{:?} is not a directory", dir).into()));
        }
    } else {
        return std::fs::create_dir_all(dir).map_err(|e| {
            ValidationError::new("InvalidDirectory").with_message(
                format!("cannot create or access directory {:?}: {}", dir, e).into(),
            )
        });
    }

    Ok(())
}

pub fn validate_writable_dir<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    validate_dir_exist_or_created(dir)?;
    let md = std::fs::metadata(dir).map_err(|e| {
        ValidationError::new("InvalidDirectory")
            .with_message(format!("cannot access metadata for {:?}: {}", dir, e).into())
    })?;
    if md.permissions().readonly() {
        Err(ValidationError::new("InvalidDirectory")
            .with_message(format!("cannot write to dir {:?}", dir).into()))
    } else {
        Ok(())
    }
}

pub fn validate_absolute_path<P: AsRef<Path>>(path: P) -> Result<(), ValidationError> {
    let path = path.as_ref();
    if path.is_absolute() {
        Ok(())
    } else {
        Err(ValidationError::new("InvalidPath")
            .with_message(format!("{:?} is not an absolute path", path).into()))
    }
}

/// Cloud Storage naming rules: 3-63 chars of lowercase letters, digits, `-`, `_` and `.`,
/// starting and ending with a letter or digit
pub fn validate_bucket_name<S: AsRef<str>>(name: S) -> Result<(), ValidationError> {
    let name = name.as_ref();
    let invalid = |reason: &str| -> Result<(), ValidationError> {
        Err(ValidationError::new("InvalidBucketName")
            .with_message(format!("Invalid bucket name {name:?}: {reason}").into()))
    };

    if name.len() < BUCKET_NAME_MIN_LEN || name.len() > BUCKET_NAME_MAX_LEN {
        return invalid("length must be between 3 and 63");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'))
    {
        return invalid("only lowercase letters, digits, '-', '_' and '.' are allowed");
    }
    let alnum = |c: Option<char>| c.is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if !alnum(name.chars().next()) || !alnum(name.chars().last()) {
        return invalid("must start and end with a letter or digit");
    }

    Ok(())
}
