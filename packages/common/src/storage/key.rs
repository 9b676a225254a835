use super::error::StorageError;

const MAX_KEY_LENGTH: usize = 512;

/// Validate an object key: relative, `/`-separated, no empty or dot segments.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("key is empty".into()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(StorageError::InvalidKey(format!(
            "key longer than {MAX_KEY_LENGTH} bytes"
        )));
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(StorageError::InvalidKey(format!("'{key}' is not relative")));
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(StorageError::InvalidKey(format!(
                "'{key}' contains an empty or dot segment"
            )));
        }
        if segment.chars().any(|c| c.is_control()) {
            return Err(StorageError::InvalidKey(format!(
                "'{key}' contains control characters"
            )));
        }
    }
    Ok(())
}
