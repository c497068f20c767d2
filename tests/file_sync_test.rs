//! Content-addressed save, hash dedup, and outbox sync end to end.

mod common;

use bytes::Bytes;
use pixvault_core::error::ErrorKind;
use pixvault_core::types::PageRequest;
use pixvault_entity::node::ROOT_ID;
use pixvault_entity::task::TaskStatus;

use common::{count_tasks, test_env};

#[tokio::test]
async fn save_materializes_ancestors_and_enqueues_one_upload() {
    let env = test_env().await;
    let node = env
        .files
        .save(Bytes::from_static(b"cat picture"), "/a/b/c.png")
        .await
        .unwrap();

    let a = env.tree.resolve("/a").await.unwrap().unwrap();
    let b = env.tree.resolve("/a/b").await.unwrap().unwrap();
    assert!(a.is_folder && b.is_folder);
    assert_eq!(a.parent_id, ROOT_ID);
    assert_eq!(b.parent_id, a.id);
    assert_eq!(node.parent_id, b.id);
    assert_eq!(node.name, "c");
    assert_eq!(node.ext_name, ".png");
    assert_eq!(node.content_type, "image/png");
    assert!(!node.hash.is_empty());

    let resolved = env.tree.resolve("/a/b/c.png").await.unwrap().unwrap();
    assert_eq!(resolved.id, node.id);

    assert_eq!(count_tasks(&env, "upload").await, 1);
    let task = env
        .task_repo
        .find_by_id(env.db.pool(), 1)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(task.remote_path, node.remote_path());
    assert_eq!(task.status, TaskStatus::Waiting);
}

#[tokio::test]
async fn identical_bytes_share_one_hash_and_one_upload_task() {
    let env = test_env().await;
    let first = env
        .files
        .save(Bytes::from_static(b"same bytes"), "/x/one.png")
        .await
        .unwrap();
    let second = env
        .files
        .save(Bytes::from_static(b"same bytes"), "/y/two.png")
        .await
        .unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(first.hash, second.hash);
    assert_eq!(count_tasks(&env, "upload").await, 1);

    // One physical object in the remote store after a drain.
    env.queue.run().await.unwrap();
    assert_eq!(env.content.list("").await.unwrap().len(), 1);
}

#[tokio::test]
async fn deleting_a_shared_hash_node_keeps_the_remote_object() {
    let env = test_env().await;
    let first = env
        .files
        .save(Bytes::from_static(b"shared"), "/x/one.png")
        .await
        .unwrap();
    env.files
        .save(Bytes::from_static(b"shared"), "/y/two.png")
        .await
        .unwrap();

    env.tree
        .delete(&["/x/one.png".to_string()], false)
        .await
        .unwrap();
    // The other node still references the hash: no remote delete.
    assert_eq!(count_tasks(&env, "delete").await, 0);

    env.tree
        .delete(&["/y/two.png".to_string()], false)
        .await
        .unwrap();
    // Last reference gone: exactly one remote delete.
    assert_eq!(count_tasks(&env, "delete").await, 1);
    let _ = first;
}

#[tokio::test]
async fn save_then_drain_then_delete_round_trips_the_remote() {
    let env = test_env().await;
    let node = env
        .files
        .save(Bytes::from_static(b"payload"), "/img/photo.jpg")
        .await
        .unwrap();

    let report = env.queue.run().await.unwrap();
    assert_eq!(report.uploaded, 1);
    assert_eq!(
        env.content
            .download_bytes(&node.remote_path())
            .await
            .unwrap(),
        Bytes::from_static(b"payload")
    );

    env.files.delete_by_ids(&[node.id]).await.unwrap();
    let report = env.queue.run().await.unwrap();
    assert_eq!(report.deleted, 1);
    assert!(env.content.download_bytes(&node.remote_path()).await.is_err());
    assert!(env.tree.resolve("/img/photo.jpg").await.unwrap().is_none());
}

#[tokio::test]
async fn download_repopulates_an_evicted_cache_file() {
    let env = test_env().await;
    let node = env
        .files
        .save(Bytes::from_static(b"warm"), "/cold/file.bin")
        .await
        .unwrap();
    env.queue.run().await.unwrap();

    // Evict the cached copy; the next read must pull from remote.
    env.content
        .remove_cache(&node.hash, &node.ext_name)
        .await
        .unwrap();
    let path = env.files.download(&node).await.unwrap();
    assert_eq!(tokio::fs::read(&path).await.unwrap(), b"warm");
}

#[tokio::test]
async fn save_into_an_occupied_name_conflicts() {
    let env = test_env().await;
    env.files
        .save(Bytes::from_static(b"first"), "/dup.png")
        .await
        .unwrap();
    let err = env
        .files
        .save(Bytes::from_static(b"second"), "/dup.png")
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
}

#[tokio::test]
async fn delete_by_id_reaches_nested_nodes() {
    let env = test_env().await;
    let node = env
        .files
        .save(Bytes::from_static(b"deep"), "/a/b/c/d.gif")
        .await
        .unwrap();

    env.files.delete_by_ids(&[node.id]).await.unwrap();
    assert!(env.tree.resolve("/a/b/c/d.gif").await.unwrap().is_none());
    // Ancestor folders stay.
    assert!(env.tree.resolve("/a/b/c").await.unwrap().is_some());
}

#[tokio::test]
async fn file_listing_paginates_newest_first() {
    let env = test_env().await;
    for i in 0..5 {
        env.files
            .save(Bytes::from(format!("content {i}").into_bytes()), &format!("/f{i}.txt"))
            .await
            .unwrap();
    }

    let page = env.files.files(PageRequest::new(1, 2)).await.unwrap();
    assert_eq!(page.total_items, 5);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.total_pages(), 3);

    let last = env.files.files(PageRequest::new(3, 2)).await.unwrap();
    assert_eq!(last.items.len(), 1);
}

#[tokio::test]
async fn failed_then_recovered_upload_settles_idempotently() {
    let env = test_env().await;
    let node = env
        .files
        .save(Bytes::from_static(b"flaky"), "/retry.me")
        .await
        .unwrap();

    // Sabotage the cached file so the first drain fails.
    let cache_path = env.content.cache_path(&node.hash, &node.ext_name);
    tokio::fs::remove_file(&cache_path).await.unwrap();
    let report = env.queue.run().await.unwrap();
    assert_eq!(report.failed, 1);

    // Restore the file; the zero-backoff retry claims it again.
    env.content
        .write_cache(b"flaky", &node.hash, &node.ext_name)
        .await
        .unwrap();
    let report = env.queue.run().await.unwrap();
    assert_eq!(report.uploaded, 1);
    assert_eq!(
        env.content
            .download_bytes(&node.remote_path())
            .await
            .unwrap(),
        Bytes::from_static(b"flaky")
    );

    // Settled: nothing left to claim.
    assert_eq!(env.queue.run().await.unwrap().claimed, 0);
}
