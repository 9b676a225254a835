use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use common::storage::filesystem::FilesystemObjectStore;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use spec_server::cache::{MemoryCache, SpecCache, run_cache_sweeper};
use spec_server::config::AppConfig;
use spec_server::database::init_db;
use spec_server::ingestion::{
    IngestionContext, IngestionCoordinator, MediaProcessor, StagingArea, WorkerPool,
};
use spec_server::notifications::LogNotificationSink;
use spec_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spec_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(AppConfig::load().context("Failed to load configuration")?);

    let db = init_db(&config.database.url)
        .await
        .context("Failed to connect to database")?;
    info!("Database connected, schema synced");

    let media_files = Arc::new(
        FilesystemObjectStore::new(
            config.storage.base_path.clone(),
            config.storage.public_base_url.clone(),
            config.storage.signing_secret.clone(),
            config.storage.max_object_size,
        )
        .await
        .context("Failed to initialise object storage")?,
    );

    let memory_cache = Arc::new(MemoryCache::new());
    tokio::spawn(run_cache_sweeper(
        memory_cache.clone(),
        Duration::from_secs(config.cache.sweep_interval_secs.max(1)),
    ));
    let cache = SpecCache::new(memory_cache, config.cache.ttl());

    let staging = StagingArea::new(
        config.ingestion.staging_dir.clone(),
        config.ingestion.max_upload_size,
    )
    .await
    .context("Failed to create staging directory")?;

    let pool = Arc::new(WorkerPool::new(config.ingestion.max_concurrent_jobs));

    let ctx = Arc::new(IngestionContext {
        db: db.clone(),
        store: media_files.clone(),
        processor: MediaProcessor::new(
            media_files.clone(),
            config.ingestion.image_max_dimension,
            config.ingestion.jpeg_quality,
        ),
        cache: cache.clone(),
        notifier: Arc::new(LogNotificationSink),
    });

    let state = AppState {
        db,
        config: config.clone(),
        object_store: media_files.clone(),
        media_files,
        cache,
        staging,
        coordinator: Arc::new(IngestionCoordinator::new(ctx, pool.clone())),
    };

    let app = spec_server::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped accepting connections");
    pool.shutdown().await;
    info!("Graceful shutdown complete");

    Ok(())
}

/// Resolve on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
