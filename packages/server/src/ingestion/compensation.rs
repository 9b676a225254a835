use common::storage::ObjectStore;
use tracing::{info, warn};

/// Result of a best-effort batch delete. Failed deletions are recorded, not
/// retried, and never stop the remaining deletions.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RollbackReport {
    pub attempted: usize,
    /// `(key, error)` for every delete that failed.
    pub failed: Vec<(String, String)>,
}

impl RollbackReport {
    pub fn deleted(&self) -> usize {
        self.attempted - self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Delete every key in `keys` from `store`.
pub async fn delete_objects(store: &dyn ObjectStore, keys: &[String]) -> RollbackReport {
    let mut report = RollbackReport::default();

    for key in keys {
        report.attempted += 1;
        if let Err(e) = store.delete(key).await {
            warn!(key = %key, error = %e, "Failed to delete stored object");
            report.failed.push((key.clone(), e.to_string()));
        }
    }

    if report.attempted > 0 {
        info!(
            attempted = report.attempted,
            failed = report.failed.len(),
            "Deleted stored objects"
        );
    }

    report
}
