#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Processing state of a Spec's media ingestion.
///
/// Only `Pending -> Processing -> {Completed, Failed}` is legal; the two
/// outcomes are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    /// Row exists, ingestion not yet scheduled.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "pending"))]
    Pending,
    /// Background job is uploading media.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "processing"))]
    Processing,
    /// All media stored and URLs persisted.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "completed"))]
    Completed,
    /// Job failed and was rolled back.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "failed"))]
    Failed,
}

impl ProcessingStatus {
    pub const ALL: &'static [ProcessingStatus] = &[
        Self::Pending,
        Self::Processing,
        Self::Completed,
        Self::Failed,
    ];

    /// Whether moving from `self` to `next` respects the forward-only state machine.
    pub fn can_transition_to(&self, next: ProcessingStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }

    /// Every status `next` may legally be entered from.
    pub fn predecessors_of(next: ProcessingStatus) -> Vec<ProcessingStatus> {
        Self::ALL
            .iter()
            .copied()
            .filter(|from| from.can_transition_to(next))
            .collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for ProcessingStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Error when parsing an invalid status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError {
    invalid: String,
}

impl fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid processing status '{}'. Valid values: {}",
            self.invalid,
            ProcessingStatus::ALL
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl std::error::Error for ParseStatusError {}

impl FromStr for ProcessingStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseStatusError {
                invalid: s.to_string(),
            }),
        }
    }
}
