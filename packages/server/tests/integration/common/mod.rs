use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use common::storage::filesystem::FilesystemObjectStore;
use common::storage::{BoxReader, ObjectStore, StorageError};
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
    DbBackend, EntityTrait, QueryFilter, QueryOrder, Schema, Set,
};
use serde_json::Value;
use tempfile::TempDir;
use uuid::Uuid;

use spec_server::cache::{Cache, MemoryCache, SpecCache, spec_cache_key};
use spec_server::config::{
    AppConfig, AuthConfig, CacheConfig, CorsConfig, DatabaseConfig, IngestionConfig, ServerConfig,
    StorageConfig,
};
use spec_server::entity::{genre, license_option, purchase, spec, spec_genre};
use spec_server::ingestion::{
    FileRole, IngestionContext, IngestionCoordinator, InlineExecutor, MediaProcessor, StagedFiles,
    StagingArea,
};
use spec_server::notifications::{NotificationSink, NotifyError, Severity};
use spec_server::state::AppState;

pub const JWT_SECRET: &str = "test-secret-for-integration-tests";

pub mod routes {
    use uuid::Uuid;

    pub const SPECS: &str = "/api/v1/specs";

    pub fn spec(id: Uuid) -> String {
        format!("/api/v1/specs/{id}")
    }
}

/// Object store that fails uploads into one folder and forwards everything
/// else to a filesystem store.
pub struct FaultyStore {
    inner: Arc<FilesystemObjectStore>,
    failing_folder: Mutex<Option<String>>,
}

impl FaultyStore {
    /// Make every upload whose key starts with `folder/` fail.
    pub fn fail_uploads_to(&self, folder: &str) {
        *self.failing_folder.lock().unwrap() = Some(format!("{folder}/"));
    }
}

#[async_trait]
impl ObjectStore for FaultyStore {
    async fn put_stream(
        &self,
        key: &str,
        reader: BoxReader,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let failing = self.failing_folder.lock().unwrap().clone();
        if let Some(prefix) = failing
            && key.starts_with(&prefix)
        {
            return Err(StorageError::Io(std::io::Error::other("injected upload failure")));
        }
        self.inner.put_stream(key, reader, content_type).await
    }

    async fn get_stream(&self, key: &str) -> Result<BoxReader, StorageError> {
        self.inner.get_stream(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.inner.delete(key).await
    }

    async fn presign(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        self.inner.presign(key, ttl).await
    }

    fn key_for_url(&self, url: &str) -> Option<String> {
        self.inner.key_for_url(url)
    }
}

/// A notification captured by [`RecordingSink`].
#[derive(Clone, Debug)]
pub struct Sent {
    pub user_id: Uuid,
    pub title: String,
    pub severity: Severity,
}

#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(
        &self,
        user_id: Uuid,
        title: &str,
        _body: &str,
        severity: Severity,
    ) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(Sent {
            user_id,
            title: title.to_string(),
            severity,
        });
        Ok(())
    }
}

/// A running test server backed by SQLite and a temporary object store.
/// Ingestion jobs run inline, so they have finished when Create returns.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub db: DatabaseConnection,
    pub store: Arc<FaultyStore>,
    pub cache: Arc<MemoryCache>,
    pub notifications: Arc<RecordingSink>,
    pub coordinator: Arc<IngestionCoordinator>,
    pub ingestion: Arc<IngestionContext>,
    pub staging: StagingArea,
    pub objects_dir: PathBuf,
    pub staging_dir: PathBuf,
    _dir: TempDir,
}

/// Parsed HTTP response for test assertions.
pub struct TestResponse {
    pub status: u16,
    /// Raw response body as text.
    pub text: String,
    /// Parsed JSON body, or `Null` if the response is not valid JSON.
    pub body: Value,
    /// Value of the `X-Cache` header, if present.
    pub cache: Option<String>,
}

/// One file part of a Spec upload.
pub struct Upload {
    pub field: &'static str,
    pub file_name: &'static str,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(field: &'static str, file_name: &'static str, bytes: Vec<u8>) -> Self {
        Self {
            field,
            file_name,
            bytes,
        }
    }

    pub fn image() -> Self {
        Self::new("image", "cover.png", png_bytes(1000, 500))
    }

    pub fn preview() -> Self {
        Self::new("preview", "preview.mp3", b"ID3 fake preview audio".to_vec())
    }

    pub fn wav() -> Self {
        Self::new("wav", "master.wav", b"RIFF fake wav master".to_vec())
    }

    pub fn stems() -> Self {
        Self::new("stems", "stems.zip", b"PK fake stems archive".to_vec())
    }
}

/// Encode a solid-colour PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 40, 90]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

async fn create_schema(db: &DatabaseConnection) {
    let backend = DbBackend::Sqlite;
    let schema = Schema::new(backend);

    let statements = [
        schema.create_table_from_entity(spec::Entity),
        schema.create_table_from_entity(genre::Entity),
        schema.create_table_from_entity(license_option::Entity),
        schema.create_table_from_entity(spec_genre::Entity),
        schema.create_table_from_entity(purchase::Entity),
    ];
    for stmt in statements {
        db.execute_raw(backend.build(&stmt))
            .await
            .expect("Failed to create table");
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let objects_dir = dir.path().join("objects");
        let staging_dir = dir.path().join("staging");

        let db_url = format!("sqlite://{}?mode=rwc", dir.path().join("specs.db").display());
        let mut opts = ConnectOptions::new(&db_url);
        opts.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = Database::connect(opts)
            .await
            .expect("Failed to connect to test database");
        create_schema(&db).await;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();
        let public_base_url = format!("http://{addr}/media");

        let app_config = AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                cors: CorsConfig {
                    allow_origins: vec![],
                    max_age: 3600,
                },
            },
            database: DatabaseConfig {
                url: db_url.clone(),
            },
            auth: AuthConfig {
                jwt_secret: JWT_SECRET.to_string(),
            },
            storage: StorageConfig {
                base_path: objects_dir.clone(),
                public_base_url: public_base_url.clone(),
                signing_secret: "test-signing-secret".to_string(),
                max_object_size: 16 * 1024 * 1024,
                presign_ttl_secs: 3600,
            },
            ingestion: IngestionConfig {
                staging_dir: staging_dir.clone(),
                max_upload_size: 16 * 1024 * 1024,
                image_max_dimension: 500,
                jpeg_quality: 85,
                max_concurrent_jobs: 1,
            },
            cache: CacheConfig {
                ttl_secs: 600,
                sweep_interval_secs: 60,
            },
        };

        let files = Arc::new(
            FilesystemObjectStore::new(
                objects_dir.clone(),
                public_base_url,
                app_config.storage.signing_secret.clone(),
                app_config.storage.max_object_size,
            )
            .await
            .expect("Failed to create object store"),
        );
        let store = Arc::new(FaultyStore {
            inner: files.clone(),
            failing_folder: Mutex::new(None),
        });

        let memory_cache = Arc::new(MemoryCache::new());
        let cache = SpecCache::new(memory_cache.clone(), app_config.cache.ttl());
        let notifications = Arc::new(RecordingSink::default());

        let staging = StagingArea::new(staging_dir.clone(), app_config.ingestion.max_upload_size)
            .await
            .expect("Failed to create staging dir");

        let ctx = Arc::new(IngestionContext {
            db: db.clone(),
            store: store.clone(),
            processor: MediaProcessor::new(store.clone(), 500, 85),
            cache: cache.clone(),
            notifier: notifications.clone(),
        });

        let coordinator = Arc::new(IngestionCoordinator::new(ctx.clone(), Arc::new(InlineExecutor)));

        let state = AppState {
            db: db.clone(),
            config: Arc::new(app_config),
            object_store: store.clone(),
            media_files: files,
            cache,
            staging: staging.clone(),
            coordinator: coordinator.clone(),
        };

        let app = spec_server::build_router(state);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            client: Client::new(),
            db,
            store,
            cache: memory_cache,
            notifications,
            coordinator,
            ingestion: ctx,
            staging,
            objects_dir,
            staging_dir,
            _dir: dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Token for a fresh producer identity.
    pub fn producer(&self) -> (Uuid, String) {
        let id = Uuid::new_v4();
        let token = spec_server::utils::jwt::sign(
            JWT_SECRET,
            id,
            "producer",
            chrono::Duration::hours(1),
        )
        .expect("sign token");
        (id, token)
    }

    fn form(metadata: Option<&Value>, uploads: Vec<Upload>) -> Form {
        let mut form = Form::new();
        if let Some(metadata) = metadata {
            form = form.text("metadata", metadata.to_string());
        }
        for upload in uploads {
            form = form.part(
                upload.field,
                Part::bytes(upload.bytes).file_name(upload.file_name),
            );
        }
        form
    }

    pub async fn create_spec(
        &self,
        token: &str,
        metadata: &Value,
        uploads: Vec<Upload>,
    ) -> TestResponse {
        self.create_spec_raw(Some(token), Some(metadata), uploads).await
    }

    pub async fn create_spec_raw(
        &self,
        token: Option<&str>,
        metadata: Option<&Value>,
        uploads: Vec<Upload>,
    ) -> TestResponse {
        let mut req = self
            .client
            .post(self.url(routes::SPECS))
            .multipart(Self::form(metadata, uploads));
        if let Some(token) = token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        let res = req.send().await.expect("Failed to send create request");
        TestResponse::from_response(res).await
    }

    pub async fn update_spec(
        &self,
        id: Uuid,
        token: &str,
        metadata: &Value,
        uploads: Vec<Upload>,
    ) -> TestResponse {
        let res = self
            .client
            .patch(self.url(&routes::spec(id)))
            .header("Authorization", format!("Bearer {token}"))
            .multipart(Self::form(Some(metadata), uploads))
            .send()
            .await
            .expect("Failed to send PATCH request");
        TestResponse::from_response(res).await
    }

    pub async fn get(&self, path_or_url: &str) -> TestResponse {
        let url = if path_or_url.starts_with("http") {
            path_or_url.to_string()
        } else {
            self.url(path_or_url)
        };
        let res = self
            .client
            .get(url)
            .send()
            .await
            .expect("Failed to send GET request");
        TestResponse::from_response(res).await
    }

    pub async fn get_bytes(&self, url: &str) -> (u16, Vec<u8>) {
        let res = self
            .client
            .get(url)
            .send()
            .await
            .expect("Failed to send GET request");
        let status = res.status().as_u16();
        let bytes = res.bytes().await.unwrap_or_default().to_vec();
        (status, bytes)
    }

    pub async fn delete_with_token(&self, path: &str, token: &str) -> TestResponse {
        let res = self
            .client
            .delete(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .expect("Failed to send DELETE request");
        TestResponse::from_response(res).await
    }

    /// Create a Spec and assert it was accepted, returning its id.
    pub async fn create_accepted(&self, token: &str, metadata: &Value, uploads: Vec<Upload>) -> Uuid {
        let res = self.create_spec(token, metadata, uploads).await;
        assert_eq!(res.status, 202, "create failed: {}", res.text);
        res.uuid()
    }

    pub async fn find_spec(&self, id: Uuid) -> Option<spec::Model> {
        spec::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .expect("DB query failed")
    }

    /// Every license row of a Spec, including soft-deleted ones.
    pub async fn license_rows(&self, spec_id: Uuid) -> Vec<license_option::Model> {
        license_option::Entity::find()
            .filter(license_option::Column::SpecId.eq(spec_id))
            .order_by_asc(license_option::Column::CreatedAt)
            .order_by_asc(license_option::Column::Id)
            .all(&self.db)
            .await
            .expect("DB query failed")
    }

    pub async fn insert_purchase(&self, spec_id: Uuid, license_option_id: Uuid) {
        purchase::ActiveModel {
            id: Set(Uuid::new_v4()),
            license_option_id: Set(license_option_id),
            spec_id: Set(spec_id),
            buyer_id: Set(Uuid::new_v4()),
            created_at: Set(chrono::Utc::now()),
        }
        .insert(&self.db)
        .await
        .expect("insert purchase");
    }

    /// Path on disk of the object behind a stored URL.
    pub fn object_path(&self, url: &str) -> PathBuf {
        let key = self.store.key_for_url(url).expect("URL maps to a key");
        self.objects_dir.join(key)
    }

    /// Number of stored objects in a storage folder.
    pub fn objects_in(&self, folder: &str) -> usize {
        count_files(&self.objects_dir.join(folder))
    }

    pub fn staged_file_count(&self) -> usize {
        count_files(&self.staging_dir)
    }

    /// Stage uploads directly, bypassing HTTP.
    pub async fn stage(&self, uploads: Vec<Upload>) -> StagedFiles {
        let mut staged = StagedFiles::new();
        for upload in uploads {
            let role = FileRole::from_field_name(upload.field).expect("known file role");
            let chunk: Result<Bytes, Infallible> = Ok(Bytes::from(upload.bytes));
            let file = self
                .staging
                .stage_stream(Some(upload.file_name.to_string()), futures::stream::iter([chunk]))
                .await
                .expect("stage upload");
            staged.insert(role, file).expect("one file per role");
        }
        staged
    }

    /// Every Spec row created by `producer_id`.
    pub async fn specs_of(&self, producer_id: Uuid) -> Vec<spec::Model> {
        spec::Entity::find()
            .filter(spec::Column::ProducerId.eq(producer_id))
            .all(&self.db)
            .await
            .expect("DB query failed")
    }

    /// Wait for the detached cache write after a Get miss.
    pub async fn wait_until_cached(&self, id: Uuid) {
        for _ in 0..100 {
            if self.cache.get(&spec_cache_key(id)).await.unwrap().is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("spec {id} was never cached");
    }

    pub async fn is_cached(&self, id: Uuid) -> bool {
        self.cache.get(&spec_cache_key(id)).await.unwrap().is_some()
    }
}

fn count_files(dir: &Path) -> usize {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .filter(|e| e.path().is_file())
            .count(),
        Err(_) => 0,
    }
}

impl TestResponse {
    pub async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let cache = res
            .headers()
            .get("x-cache")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = res.text().await.unwrap_or_default();
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Self {
            status,
            text,
            body,
            cache,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.body["id"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .expect("response body should contain a UUID 'id'")
    }

    pub fn code(&self) -> &str {
        self.body["code"].as_str().unwrap_or_default()
    }
}
