#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of sellable unit a Spec represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Full production. Requires both a WAV master and a stems archive.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "beat"))]
    Beat,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "sample"))]
    Sample,
}

impl Category {
    /// Whether Specs of this category must ship the full-quality WAV and stems.
    pub fn requires_masters(&self) -> bool {
        matches!(self, Self::Beat)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beat => "beat",
            Self::Sample => "sample",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Purchasable license tier. At most one active option per tier per Spec.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, utoipa::ToSchema,
)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "lowercase")]
pub enum LicenseType {
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "basic"))]
    Basic,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "premium"))]
    Premium,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "trackout"))]
    Trackout,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "unlimited"))]
    Unlimited,
}

impl LicenseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Premium => "premium",
            Self::Trackout => "trackout",
            Self::Unlimited => "unlimited",
        }
    }
}

impl fmt::Display for LicenseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
