use std::sync::Arc;

use common::storage::ObjectStore;
use common::storage::filesystem::FilesystemObjectStore;
use sea_orm::DatabaseConnection;

use crate::cache::SpecCache;
use crate::config::AppConfig;
use crate::ingestion::{IngestionCoordinator, MediaProcessor, StagingArea};

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    /// Store used for uploads, deletes and presigning.
    pub object_store: Arc<dyn ObjectStore>,
    /// Local store behind `GET /media`.
    pub media_files: Arc<FilesystemObjectStore>,
    pub cache: SpecCache,
    pub staging: StagingArea,
    pub coordinator: Arc<IngestionCoordinator>,
}

impl AppState {
    pub fn processor(&self) -> &MediaProcessor {
        &self.coordinator.context().processor
    }
}
