use std::path::Path;
use thiserror::Error;

/// Prefix of in-flight upload files. Names carrying it are hidden from
/// listings and refused as client targets.
pub const TEMP_PREFIX: &str = ".upload-";

/// Suffix of in-flight upload files.
pub const TEMP_SUFFIX: &str = ".part";

/// Longest accepted entry name in bytes.
pub const MAX_NAME_LENGTH: usize = 255;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("size {size} bytes exceeds maximum allowed {max} bytes")]
    TooLarge { size: u64, max: u64 },

    #[error("file extension '.{0}' is not allowed")]
    BlockedExtension(String),

    #[error("name '{0}' is reserved")]
    ReservedName(String),

    #[error("name exceeds {MAX_NAME_LENGTH} bytes")]
    NameTooLong,
}

/// Validates a size against the upload limit. Equal to the limit is accepted.
pub fn validate_file_size(size: u64, max_size: u64) -> Result<(), ValidationError> {
    if size > max_size {
        return Err(ValidationError::TooLarge {
            size,
            max: max_size,
        });
    }
    Ok(())
}

pub fn is_temp_name(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX)
}

/// Checks the final component of a client target.
pub fn validate_entry_name(name: &str) -> Result<(), ValidationError> {
    if name.len() > MAX_NAME_LENGTH {
        return Err(ValidationError::NameTooLong);
    }
    if name.starts_with(TEMP_PREFIX) {
        tracing::warn!("Rejected reserved name: {}", name);
        return Err(ValidationError::ReservedName(name.to_string()));
    }
    Ok(())
}

/// Checks an upload name against the configured extension blocklist.
///
/// `blocked` holds lowercase extensions without the leading dot.
pub fn validate_extension(name: &str, blocked: &[String]) -> Result<(), ValidationError> {
    if let Some(ext) = Path::new(name).extension().and_then(|e| e.to_str()) {
        let ext_lower = ext.to_lowercase();
        if blocked.iter().any(|b| *b == ext_lower) {
            return Err(ValidationError::BlockedExtension(ext_lower));
        }
    }
    Ok(())
}
