//! Shared fixture for integration tests: in-memory database, tempdir
//! cache, filesystem-mirror remote, and the full service stack.

use std::sync::Arc;

use tokio::sync::mpsc;

use pixvault_cache::{MemoryPathCache, PathCache};
use pixvault_core::config::cache::CacheConfig;
use pixvault_core::config::worker::WorkerConfig;
use pixvault_core::notify::SyncNotifier;
use pixvault_core::traits::remote::RemoteStore;
use pixvault_database::migration::run_migrations;
use pixvault_database::repositories::node::NodeRepository;
use pixvault_database::repositories::task::TaskRepository;
use pixvault_database::DatabasePool;
use pixvault_service::{FileService, PathTreeService, SnapshotService};
use pixvault_storage::backends::local::LocalRemoteStore;
use pixvault_storage::ContentStore;
use pixvault_worker::SyncQueue;

pub struct TestEnv {
    pub db: DatabasePool,
    pub task_repo: Arc<TaskRepository>,
    pub content: Arc<ContentStore>,
    pub tree: Arc<PathTreeService>,
    pub files: Arc<FileService>,
    pub snapshots: Arc<SnapshotService>,
    pub queue: Arc<SyncQueue>,
    // Held so notifications do not hit a closed channel; drains run
    // manually through `queue` in tests.
    _notifications: mpsc::Receiver<()>,
    _dir: tempfile::TempDir,
}

pub async fn test_env() -> TestEnv {
    let dir = tempfile::tempdir().unwrap();
    let db = DatabasePool::connect_in_memory().await.unwrap();
    run_migrations(db.pool()).await.unwrap();

    let remote = Arc::new(
        LocalRemoteStore::new(dir.path().join("remote").to_str().unwrap())
            .await
            .unwrap(),
    );
    let content = Arc::new(ContentStore::new(
        dir.path().join("data"),
        remote as Arc<dyn RemoteStore>,
    ));

    let node_repo = Arc::new(NodeRepository::new(db.pool().clone()));
    let task_repo = Arc::new(TaskRepository::new(db.pool().clone()));
    let cache: Arc<dyn PathCache> = Arc::new(MemoryPathCache::new(&CacheConfig::default()));
    let (notifier, notifications) = SyncNotifier::channel(16);

    let worker_config = WorkerConfig {
        retry_backoff_seconds: 0,
        ..WorkerConfig::default()
    };

    let tree = Arc::new(PathTreeService::new(
        node_repo.clone(),
        task_repo.clone(),
        content.clone(),
        cache.clone(),
        notifier.clone(),
    ));
    let files = Arc::new(FileService::new(
        tree.clone(),
        node_repo.clone(),
        task_repo.clone(),
        content.clone(),
        cache.clone(),
        notifier.clone(),
        50 * 1024 * 1024,
    ));
    let snapshots = Arc::new(SnapshotService::new(
        node_repo.clone(),
        content.clone(),
        cache.clone(),
    ));
    let queue = Arc::new(SyncQueue::new(
        task_repo.clone(),
        content.clone(),
        worker_config,
    ));

    TestEnv {
        db,
        task_repo,
        content,
        tree,
        files,
        snapshots,
        queue,
        _notifications: notifications,
        _dir: dir,
    }
}

/// Count outbox rows matching an action.
pub async fn count_tasks(env: &TestEnv, action: &str) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sync_tasks WHERE action = ?")
        .bind(action)
        .fetch_one(env.db.pool())
        .await
        .unwrap()
}
