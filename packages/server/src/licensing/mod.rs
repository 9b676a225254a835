//! License option reconciliation for Spec updates.

mod reconciler;

pub use reconciler::{
    LicenseOperation, LicenseReconciler, ReconcileError, ReconcileSummary, plan,
};
