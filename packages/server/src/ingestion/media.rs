use std::io::Cursor;
use std::sync::Arc;

use common::storage::{BoxReader, ObjectStore, StorageError};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::role::{FileRole, Transform};
use super::staging::StagedFile;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("failed to read staged file: {0}")]
    Io(#[from] std::io::Error),

    #[error("image transform failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("upload failed: {0}")]
    Storage(#[from] StorageError),

    #[error("transform task failed: {0}")]
    Task(String),
}

/// A stored object: its key for rollback and its URL for persistence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
}

/// Turns one staged file into one stored object, dispatching on its role.
pub struct MediaProcessor {
    store: Arc<dyn ObjectStore>,
    image_max_dimension: u32,
    jpeg_quality: u8,
}

impl MediaProcessor {
    pub fn new(store: Arc<dyn ObjectStore>, image_max_dimension: u32, jpeg_quality: u8) -> Self {
        Self {
            store,
            image_max_dimension,
            jpeg_quality,
        }
    }

    pub async fn process(
        &self,
        role: FileRole,
        file: &StagedFile,
    ) -> Result<StoredObject, MediaError> {
        let spec = role.spec();

        let key = match spec.transform {
            Transform::BoundedJpeg => object_key(role, None),
            Transform::None => object_key(role, file.extension().as_deref()),
        };

        let url = match spec.transform {
            Transform::BoundedJpeg => {
                let data = tokio::fs::read(&file.path).await?;
                let max = self.image_max_dimension;
                let quality = self.jpeg_quality;
                let jpeg = tokio::task::spawn_blocking(move || fit_to_jpeg(&data, max, quality))
                    .await
                    .map_err(|e| MediaError::Task(e.to_string()))??;
                self.store.put(&key, &jpeg, spec.content_type).await?
            }
            Transform::None => {
                let staged = tokio::fs::File::open(&file.path).await?;
                let reader: BoxReader = Box::new(staged);
                self.store
                    .put_stream(&key, reader, spec.content_type)
                    .await?
            }
        };

        debug!(?role, key = %key, size = file.size, "Stored media object");

        Ok(StoredObject { key, url })
    }
}

/// Fresh object key `{folder}/{uuid}.{ext}` for `role`.
pub fn object_key(role: FileRole, extension: Option<&str>) -> String {
    let spec = role.spec();
    format!(
        "{}/{}.{}",
        spec.folder,
        Uuid::new_v4(),
        extension.unwrap_or(spec.extension)
    )
}

/// Decode an image, shrink it to fit a `max_dimension` square keeping its
/// aspect ratio, and re-encode it as JPEG. Smaller images are not upscaled.
pub fn fit_to_jpeg(data: &[u8], max_dimension: u32, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let img = image::load_from_memory(data)?;
    let img = if img.width() > max_dimension || img.height() > max_dimension {
        img.resize(max_dimension, max_dimension, FilterType::Lanczos3)
    } else {
        img
    };

    let rgb = img.to_rgb8();
    let mut out = Cursor::new(Vec::new());
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
        encoder.encode_image(&rgb)?;
    }
    Ok(out.into_inner())
}
