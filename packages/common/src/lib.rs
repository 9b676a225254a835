pub mod catalog;
pub mod processing_status;
#[cfg(feature = "object-storage")]
pub mod storage;

pub use catalog::{Category, LicenseType};
pub use processing_status::ProcessingStatus;
