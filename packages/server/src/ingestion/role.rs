use common::Category;

use crate::entity::spec;

/// Logical role of an uploaded media file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileRole {
    Image,
    Preview,
    Wav,
    Stems,
}

/// Transformation applied before a file is stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transform {
    /// Stream the staged bytes unchanged.
    None,
    /// Decode, fit inside the configured bounding box, re-encode as JPEG.
    BoundedJpeg,
}

/// Static description of how a role is handled.
#[derive(Debug)]
pub struct RoleSpec {
    /// Multipart field name carrying the file.
    pub field: &'static str,
    /// Spec column the stored URL is persisted to.
    pub url_field: &'static str,
    /// Storage folder objects are written under.
    pub folder: &'static str,
    pub content_type: &'static str,
    /// Extension used when the upload has none, or always for transformed output.
    pub extension: &'static str,
    pub transform: Transform,
    /// Objects in this folder are only served through presigned URLs.
    pub signed: bool,
}

static ROLE_TABLE: [(FileRole, RoleSpec); 4] = [
    (
        FileRole::Image,
        RoleSpec {
            field: "image",
            url_field: "image_url",
            folder: "images",
            content_type: "image/jpeg",
            extension: "jpg",
            transform: Transform::BoundedJpeg,
            signed: false,
        },
    ),
    (
        FileRole::Preview,
        RoleSpec {
            field: "preview",
            url_field: "preview_url",
            folder: "previews",
            content_type: "audio/mpeg",
            extension: "mp3",
            transform: Transform::None,
            signed: true,
        },
    ),
    (
        FileRole::Wav,
        RoleSpec {
            field: "wav",
            url_field: "wav_url",
            folder: "wav",
            content_type: "audio/wav",
            extension: "wav",
            transform: Transform::None,
            signed: true,
        },
    ),
    (
        FileRole::Stems,
        RoleSpec {
            field: "stems",
            url_field: "stems_url",
            folder: "stems",
            content_type: "application/zip",
            extension: "zip",
            transform: Transform::None,
            signed: true,
        },
    ),
];

impl FileRole {
    pub const ALL: [FileRole; 4] = [Self::Image, Self::Preview, Self::Wav, Self::Stems];

    pub fn spec(&self) -> &'static RoleSpec {
        // ROLE_TABLE is indexed in declaration order.
        &ROLE_TABLE[*self as usize].1
    }

    pub fn from_field_name(name: &str) -> Option<Self> {
        ROLE_TABLE
            .iter()
            .find(|(_, spec)| spec.field == name)
            .map(|(role, _)| *role)
    }

    /// Role whose storage folder is the first segment of `key`.
    pub fn from_key(key: &str) -> Option<Self> {
        let folder = key.split('/').next()?;
        ROLE_TABLE
            .iter()
            .find(|(_, spec)| spec.folder == folder)
            .map(|(role, _)| *role)
    }

    /// Spec column holding this role's URL.
    pub fn column(&self) -> spec::Column {
        match self {
            Self::Image => spec::Column::ImageUrl,
            Self::Preview => spec::Column::PreviewUrl,
            Self::Wav => spec::Column::WavUrl,
            Self::Stems => spec::Column::StemsUrl,
        }
    }

    /// Roles that must be uploaded before a Spec of `category` can complete.
    pub fn required_for(category: Category) -> &'static [FileRole] {
        if category.requires_masters() {
            &[Self::Wav, Self::Stems]
        } else {
            &[]
        }
    }
}
