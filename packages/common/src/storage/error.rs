use std::fmt;

/// Errors that can occur during object storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// The requested object was not found.
    NotFound(String),
    /// An I/O error occurred.
    Io(std::io::Error),
    /// The object key is malformed or escapes the store root.
    InvalidKey(String),
    /// The object exceeds the configured size limit.
    SizeLimitExceeded { actual: u64, limit: u64 },
    /// A presigned URL is expired or its signature does not match.
    InvalidSignature,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(key) => write!(f, "object not found: {key}"),
            Self::Io(err) => write!(f, "storage IO error: {err}"),
            Self::InvalidKey(msg) => write!(f, "invalid object key: {msg}"),
            Self::SizeLimitExceeded { actual, limit } => {
                write!(f, "object exceeds size limit ({actual} > {limit} bytes)")
            }
            Self::InvalidSignature => write!(f, "presigned URL is expired or invalid"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
