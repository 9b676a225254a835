use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use super::error::StorageError;

/// Type alias for a boxed async reader.
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// Durable key-addressed object storage.
///
/// `delete` is idempotent: removing a missing key succeeds.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store bytes under `key` and return the object's public URL.
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<String, StorageError> {
        let reader: BoxReader = Box::new(Cursor::new(data.to_vec()));
        self.put_stream(key, reader, content_type).await
    }

    /// Store data from an async reader under `key` and return its public URL.
    async fn put_stream(
        &self,
        key: &str,
        reader: BoxReader,
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// Open an object for streaming reads.
    async fn get_stream(&self, key: &str) -> Result<BoxReader, StorageError>;

    /// Delete an object. Missing keys are not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Produce a time-limited URL for `key`.
    async fn presign(&self, key: &str, ttl: Duration) -> Result<String, StorageError>;

    /// Map a URL previously returned by `put`/`put_stream` back to its key.
    fn key_for_url(&self, url: &str) -> Option<String>;
}
