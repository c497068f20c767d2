//! PixVault server — content-addressable hybrid storage for an
//! image-hosting service.
//!
//! Wires the storage layer together and runs the sync worker. HTTP
//! handlers mount on top of the exposed services.

use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::{fmt, EnvFilter};

use pixvault_cache::{MemoryPathCache, PathCache};
use pixvault_core::config::AppConfig;
use pixvault_core::error::AppError;
use pixvault_core::notify::SyncNotifier;
use pixvault_database::repositories::node::NodeRepository;
use pixvault_database::repositories::task::TaskRepository;
use pixvault_database::{migration, DatabasePool};
use pixvault_service::{FileService, PathTreeService, SnapshotService};
use pixvault_storage::{backends, ContentStore};
use pixvault_worker::{SyncQueue, SyncRunner};

#[tokio::main]
async fn main() {
    let env = std::env::var("PIXVAULT_ENV").unwrap_or_else(|_| "development".to_string());
    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    }
}

/// Initialize tracing/logging.
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt().json().with_env_filter(filter).with_target(true).init();
        }
        _ => {
            fmt().pretty().with_env_filter(filter).with_target(true).init();
        }
    }
}

async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting PixVault v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Data directories ─────────────────────────────────
    tokio::fs::create_dir_all(&config.storage.data_root).await?;
    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    // ── Step 2: Database + migrations ────────────────────────────
    let db = DatabasePool::connect(&config.database).await?;
    migration::run_migrations(db.pool()).await?;

    // ── Step 3: Remote backend + content store ───────────────────
    let remote = backends::from_config(&config.storage).await?;
    let content = Arc::new(ContentStore::new(config.storage.data_root.clone(), remote));

    // ── Step 4: Repositories, cache, services ────────────────────
    let node_repo = Arc::new(NodeRepository::new(db.pool().clone()));
    let task_repo = Arc::new(TaskRepository::new(db.pool().clone()));
    let cache: Arc<dyn PathCache> = Arc::new(MemoryPathCache::new(&config.cache));
    let (notifier, notifications) = SyncNotifier::channel(config.worker.notify_capacity);

    let tree = Arc::new(PathTreeService::new(
        node_repo.clone(),
        task_repo.clone(),
        content.clone(),
        cache.clone(),
        notifier.clone(),
    ));
    let _files = Arc::new(FileService::new(
        tree.clone(),
        node_repo.clone(),
        task_repo.clone(),
        content.clone(),
        cache.clone(),
        notifier.clone(),
        config.storage.max_upload_size_bytes,
    ));
    let _snapshots = Arc::new(SnapshotService::new(
        node_repo.clone(),
        content.clone(),
        cache.clone(),
    ));

    // ── Step 5: Sync worker ──────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = if config.worker.enabled {
        let queue = Arc::new(SyncQueue::new(
            task_repo.clone(),
            content.clone(),
            config.worker.clone(),
        ));
        let runner = SyncRunner::new(queue, notifications, &config.worker, shutdown_rx);
        Some(tokio::spawn(runner.run()))
    } else {
        tracing::warn!("Sync worker disabled; the outbox will not drain");
        None
    };

    tracing::info!(
        backend = content.backend_type(),
        "PixVault storage layer ready"
    );

    // ── Step 6: Shutdown ─────────────────────────────────────────
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| AppError::internal(format!("Failed to listen for shutdown signal: {e}")))?;
    tracing::info!("Shutting down...");
    let _ = shutdown_tx.send(true);
    if let Some(handle) = worker_handle {
        let _ = handle.await;
    }
    db.close().await;
    Ok(())
}
