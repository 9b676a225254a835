use chrono::{DateTime, Utc};
use common::{Category, LicenseType, ProcessingStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::shared::{validate_price, validate_title};
use crate::entity::{license_option, spec};
use crate::error::AppError;

/// License option as submitted by a producer on Create or Update.
#[derive(Clone, Debug, Deserialize, PartialEq, utoipa::ToSchema)]
pub struct LicenseOptionInput {
    /// Existing option id. Omit for a new option; options without an id are
    /// matched to an active option of the same type.
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(alias = "licenseType")]
    pub license_type: LicenseType,
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default, alias = "fileTypes")]
    pub file_types: Vec<String>,
}

/// JSON `metadata` part of the Create multipart body.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateSpecRequest {
    pub title: String,
    pub category: Category,
    #[serde(default)]
    pub bpm: i32,
    #[serde(default)]
    pub key: String,
    pub price: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "freeMp3Enabled")]
    pub free_mp3_enabled: bool,
    /// Length in seconds.
    #[serde(default)]
    pub duration: i32,
    #[serde(default)]
    pub licenses: Vec<LicenseOptionInput>,
    #[serde(default)]
    pub genres: Vec<String>,
}

impl CreateSpecRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_title(&self.title)?;
        validate_price(self.price, "Price")?;
        validate_common(self.bpm, self.duration, &self.licenses)
    }
}

/// JSON `metadata` part of the Update multipart body. Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct UpdateSpecRequest {
    pub title: Option<String>,
    pub bpm: Option<i32>,
    pub key: Option<String>,
    pub price: Option<f64>,
    pub tags: Option<Vec<String>>,
    pub description: Option<String>,
    #[serde(alias = "freeMp3Enabled")]
    pub free_mp3_enabled: Option<bool>,
    pub duration: Option<i32>,
    /// When present, the full desired set of license options.
    pub licenses: Option<Vec<LicenseOptionInput>>,
    /// When present, replaces the Spec's genres.
    pub genres: Option<Vec<String>>,
}

impl UpdateSpecRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(price) = self.price {
            validate_price(price, "Price")?;
        }
        validate_common(
            self.bpm.unwrap_or(0),
            self.duration.unwrap_or(0),
            self.licenses.as_deref().unwrap_or_default(),
        )
    }
}

fn validate_common(bpm: i32, duration: i32, licenses: &[LicenseOptionInput]) -> Result<(), AppError> {
    if bpm < 0 {
        return Err(AppError::Validation("BPM must be >= 0".into()));
    }
    if duration < 0 {
        return Err(AppError::Validation("Duration must be >= 0".into()));
    }
    for license in licenses {
        if license.name.trim().is_empty() {
            return Err(AppError::Validation("License name must not be empty".into()));
        }
        validate_price(license.price, "License price")?;
    }
    Ok(())
}

/// Parse the `metadata` multipart field.
pub fn parse_metadata<T: for<'de> Deserialize<'de>>(raw: &str) -> Result<T, AppError> {
    serde_json::from_str(raw).map_err(|e| AppError::Validation(format!("Invalid metadata: {e}")))
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct LicenseOptionResponse {
    pub id: Uuid,
    pub license_type: LicenseType,
    pub name: String,
    pub price: f64,
    pub features: Vec<String>,
    pub file_types: Vec<String>,
}

impl From<license_option::Model> for LicenseOptionResponse {
    fn from(m: license_option::Model) -> Self {
        Self {
            id: m.id,
            license_type: m.license_type,
            name: m.name,
            price: m.price,
            features: json_strings(m.features),
            file_types: json_strings(m.file_types),
        }
    }
}

/// Spec as returned by Create, Update and Get.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SpecResponse {
    pub id: Uuid,
    pub producer_id: Uuid,
    pub title: String,
    pub category: Category,
    pub bpm: i32,
    pub key: String,
    pub tags: Vec<String>,
    pub description: String,
    pub duration: i32,
    pub price: f64,
    pub free_mp3_enabled: bool,
    /// Empty until processing completes.
    pub image_url: String,
    /// Presigned on Get; empty until processing completes.
    pub preview_url: String,
    pub has_wav: bool,
    pub has_stems: bool,
    pub processing_status: ProcessingStatus,
    pub licenses: Vec<LicenseOptionResponse>,
    pub genres: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SpecResponse {
    pub fn from_parts(
        m: spec::Model,
        licenses: Vec<license_option::Model>,
        genres: Vec<String>,
    ) -> Self {
        Self {
            id: m.id,
            producer_id: m.producer_id,
            title: m.title,
            category: m.category,
            bpm: m.bpm,
            key: m.musical_key,
            tags: json_strings(m.tags),
            description: m.description,
            duration: m.duration,
            price: m.price,
            free_mp3_enabled: m.free_mp3_enabled,
            image_url: m.image_url,
            preview_url: m.preview_url,
            has_wav: m.wav_url.is_some_and(|u| !u.is_empty()),
            has_stems: m.stems_url.is_some_and(|u| !u.is_empty()),
            processing_status: m.processing_status,
            licenses: licenses.into_iter().map(Into::into).collect(),
            genres,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

/// Decode a JSON string array column, ignoring non-string entries.
pub fn json_strings(value: serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                serde_json::Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}
