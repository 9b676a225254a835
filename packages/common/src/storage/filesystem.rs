use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

use super::error::StorageError;
use super::key::validate_key;
use super::traits::{BoxReader, ObjectStore};

/// Filesystem-backed object store.
///
/// Objects live at `{base_path}/{key}` and are addressed publicly as
/// `{public_base_url}/{key}`. Content types are not persisted; readers infer
/// them from the key's extension.
pub struct FilesystemObjectStore {
    base_path: PathBuf,
    public_base_url: String,
    signing_secret: String,
    max_size: u64,
}

impl FilesystemObjectStore {
    /// Create a new filesystem object store.
    pub async fn new(
        base_path: PathBuf,
        public_base_url: impl Into<String>,
        signing_secret: impl Into<String>,
        max_size: u64,
    ) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path).await?;
        fs::create_dir_all(base_path.join(".tmp")).await?;
        Ok(Self {
            base_path,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            signing_secret: signing_secret.into(),
            max_size,
        })
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.base_path.join(key))
    }

    /// Path for a temporary file during writes.
    fn temp_path(&self) -> PathBuf {
        self.base_path
            .join(".tmp")
            .join(uuid::Uuid::new_v4().to_string())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    fn signature(&self, key: &str, expires: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.signing_secret.as_bytes());
        hasher.update(key.as_bytes());
        hasher.update(expires.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Check a presigned URL's `expires` and `signature` parameters for `key`.
    pub fn verify_signature(
        &self,
        key: &str,
        expires: i64,
        signature: &str,
    ) -> Result<(), StorageError> {
        if expires < Utc::now().timestamp() {
            return Err(StorageError::InvalidSignature);
        }
        let expected = self.signature(key, expires);
        let matches = expected.len() == signature.len()
            && expected
                .bytes()
                .zip(signature.bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0;
        if matches {
            Ok(())
        } else {
            Err(StorageError::InvalidSignature)
        }
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn put_stream(
        &self,
        key: &str,
        mut reader: BoxReader,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        let object_path = self.object_path(key)?;
        let temp_path = self.temp_path();
        let mut total_bytes: u64 = 0;

        let mut buf = vec![0u8; 64 * 1024]; // 64KB read buffer
        let mut temp_file = fs::File::create(&temp_path).await?;

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    drop(temp_file);
                    let _ = fs::remove_file(&temp_path).await;
                    return Err(e.into());
                }
            };
            if n == 0 {
                break;
            }

            total_bytes += n as u64;
            if total_bytes > self.max_size {
                drop(temp_file);
                let _ = fs::remove_file(&temp_path).await;
                return Err(StorageError::SizeLimitExceeded {
                    actual: total_bytes,
                    limit: self.max_size,
                });
            }

            temp_file.write_all(&buf[..n]).await?;
        }

        temp_file.flush().await?;
        drop(temp_file);

        if let Some(parent) = object_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        if let Err(e) = fs::rename(&temp_path, &object_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(self.public_url(key))
    }

    async fn get_stream(&self, key: &str) -> Result<BoxReader, StorageError> {
        let object_path = self.object_path(key)?;
        match fs::File::open(&object_path).await {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let object_path = self.object_path(key)?;
        match fs::remove_file(&object_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn presign(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        validate_key(key)?;
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let expires = Utc::now().timestamp().saturating_add(ttl_secs);
        Ok(format!(
            "{}?expires={}&signature={}",
            self.public_url(key),
            expires,
            self.signature(key, expires)
        ))
    }

    fn key_for_url(&self, url: &str) -> Option<String> {
        let rest = url.strip_prefix(&self.public_base_url)?.strip_prefix('/')?;
        let key = rest.split('?').next().unwrap_or(rest);
        validate_key(key).ok().map(|_| key.to_string())
    }
}
