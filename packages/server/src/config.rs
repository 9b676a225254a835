use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub max_age: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

/// Object storage settings for the filesystem backend.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub base_path: PathBuf,
    /// URL prefix under which stored objects are served, e.g. `http://host/media`.
    pub public_base_url: String,
    pub signing_secret: String,
    /// Maximum size of a single stored object in bytes.
    pub max_object_size: u64,
    pub presign_ttl_secs: u64,
}

impl StorageConfig {
    pub fn presign_ttl(&self) -> Duration {
        Duration::from_secs(self.presign_ttl_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestionConfig {
    /// Local directory where uploads are staged before the background job runs.
    pub staging_dir: PathBuf,
    /// Maximum size of a single uploaded file in bytes.
    pub max_upload_size: u64,
    /// Cover images are fit inside a square of this many pixels.
    pub image_max_dimension: u32,
    pub jpeg_quality: u8,
    pub max_concurrent_jobs: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub ingestion: IngestionConfig,
    pub cache: CacheConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let staging_default = std::env::temp_dir().join("spec-staging");

        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.cors.allow_origins", Vec::<String>::new())?
            .set_default("server.cors.max_age", 3600)?
            .set_default("storage.base_path", "./data/objects")?
            .set_default("storage.public_base_url", "http://127.0.0.1:3000/media")?
            .set_default("storage.max_object_size", 512 * 1024 * 1024_i64)?
            .set_default("storage.presign_ttl_secs", 3600)?
            .set_default(
                "ingestion.staging_dir",
                staging_default.to_string_lossy().to_string(),
            )?
            .set_default("ingestion.max_upload_size", 512 * 1024 * 1024_i64)?
            .set_default("ingestion.image_max_dimension", 500)?
            .set_default("ingestion.jpeg_quality", 85)?
            .set_default("ingestion.max_concurrent_jobs", 4)?
            .set_default("cache.ttl_secs", 600)?
            .set_default("cache.sweep_interval_secs", 60)?
            // Load from config/config.toml
            .add_source(File::with_name("config/config").required(false))
            // Override from environment (e.g., SPECS__AUTH__JWT_SECRET)
            .add_source(Environment::with_prefix("SPECS").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
