use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};

use axum::body::Bytes;
use axum::extract::multipart::Field;
use futures::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use tracing::warn;
use uuid::Uuid;

use super::role::FileRole;
use crate::error::AppError;

/// An upload copied to local disk, independent of the request body.
///
/// The file is deleted when the value is dropped, so a request future that
/// is cancelled mid-flight leaves nothing behind. [`StagedFile::remove`]
/// does the same without blocking the runtime.
#[derive(Debug)]
pub struct StagedFile {
    pub path: PathBuf,
    /// Filename supplied by the client, if any.
    pub original_name: Option<String>,
    pub size: u64,
    on_disk: bool,
}

impl StagedFile {
    fn new(path: PathBuf, original_name: Option<String>) -> Self {
        Self {
            path,
            original_name,
            size: 0,
            on_disk: true,
        }
    }

    /// Delete the file now.
    pub async fn remove(mut self) {
        remove_staged(&self.path).await;
        self.on_disk = false;
    }

    /// Lowercase extension of the client filename, if it is short and alphanumeric.
    pub fn extension(&self) -> Option<String> {
        let name = self.original_name.as_deref()?;
        let ext = Path::new(name).extension()?.to_str()?;
        if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.on_disk {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %self.path.display(), error = %e, "Failed to remove staged file");
        }
    }
}

/// Staged files of one request, keyed by role.
#[derive(Debug, Default)]
pub struct StagedFiles {
    files: BTreeMap<FileRole, StagedFile>,
}

impl StagedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file. Fails if the role was already staged; the caller keeps
    /// ownership of the rejected file.
    pub fn insert(&mut self, role: FileRole, file: StagedFile) -> Result<(), StagedFile> {
        if self.files.contains_key(&role) {
            return Err(file);
        }
        self.files.insert(role, file);
        Ok(())
    }

    pub fn get(&self, role: FileRole) -> Option<&StagedFile> {
        self.files.get(&role)
    }

    pub fn contains(&self, role: FileRole) -> bool {
        self.files.contains_key(&role)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FileRole, &StagedFile)> {
        self.files.iter().map(|(role, file)| (*role, file))
    }

    /// Remove every staged file from disk.
    pub async fn cleanup(self) {
        for (_, file) in self.files {
            file.remove().await;
        }
    }
}

/// Local directory uploads are staged into.
#[derive(Clone, Debug)]
pub struct StagingArea {
    dir: PathBuf,
    max_file_size: u64,
}

impl StagingArea {
    pub async fn new(dir: PathBuf, max_file_size: u64) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir, max_file_size })
    }

    fn temp_path(&self) -> PathBuf {
        self.dir.join(format!("spec-upload-{}", Uuid::new_v4()))
    }

    /// Stream a multipart field to a new staged file.
    pub async fn stage_field(&self, field: Field<'_>) -> Result<StagedFile, AppError> {
        let original_name = field.file_name().map(str::to_string);
        self.stage_stream(original_name, field).await
    }

    /// Write a stream of chunks to a new staged file, enforcing the size cap.
    pub async fn stage_stream<S, E>(
        &self,
        original_name: Option<String>,
        chunks: S,
    ) -> Result<StagedFile, AppError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let mut staged = StagedFile::new(self.temp_path(), original_name);
        let mut chunks = std::pin::pin!(chunks);

        let result = async {
            let mut temp_file = tokio::fs::File::create(&staged.path)
                .await
                .map_err(|e| AppError::Staging(format!("Failed to create temp file: {e}")))?;

            let mut total_size: u64 = 0;

            while let Some(chunk) = chunks.next().await {
                let chunk =
                    chunk.map_err(|e| AppError::Validation(format!("Upload read error: {e}")))?;
                total_size += chunk.len() as u64;
                if total_size > self.max_file_size {
                    return Err(AppError::Validation(format!(
                        "File exceeds maximum size of {} bytes",
                        self.max_file_size
                    )));
                }
                temp_file
                    .write_all(&chunk)
                    .await
                    .map_err(|e| AppError::Staging(format!("Temp file write failed: {e}")))?;
            }

            temp_file
                .flush()
                .await
                .map_err(|e| AppError::Staging(format!("Temp file flush failed: {e}")))?;

            Ok(total_size)
        }
        .await;

        match result {
            Ok(size) => {
                staged.size = size;
                Ok(staged)
            }
            Err(e) => {
                staged.remove().await;
                Err(e)
            }
        }
    }
}

async fn remove_staged(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove staged file"),
    }
}
