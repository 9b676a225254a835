//! Create-time ingestion: staging, background media processing and rollback.

pub mod compensation;
pub mod coordinator;
pub mod executor;
pub mod job;
pub mod media;
pub mod role;
pub mod staging;

pub use compensation::{RollbackReport, delete_objects};
pub use coordinator::IngestionCoordinator;
pub use executor::{InlineExecutor, Job, JobExecutor, WorkerPool};
pub use job::{IngestionContext, IngestionJob, JobError, JobOutcome};
pub use media::{MediaError, MediaProcessor, StoredObject};
pub use role::FileRole;
pub use staging::{StagedFile, StagedFiles, StagingArea};
