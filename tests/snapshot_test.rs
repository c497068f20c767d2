//! Node-table snapshot export, restore, and remote persistence.

mod common;

use bytes::Bytes;
use pixvault_core::error::ErrorKind;
use pixvault_entity::snapshot::NodeSnapshot;

use common::test_env;

#[tokio::test]
async fn export_restore_round_trip_preserves_rows() {
    let env = test_env().await;
    env.files
        .save(Bytes::from_static(b"one"), "/keep/one.png")
        .await
        .unwrap();
    let two = env
        .files
        .save(Bytes::from_static(b"two"), "/keep/two.png")
        .await
        .unwrap();

    let snapshot = env.snapshots.export().await.unwrap();
    assert_eq!(snapshot.nodes.len(), 3); // folder + two files

    env.tree
        .delete(&["/keep/two.png".to_string()], false)
        .await
        .unwrap();
    assert!(env.tree.resolve("/keep/two.png").await.unwrap().is_none());

    env.snapshots.restore(&snapshot).await.unwrap();
    let restored = env.tree.resolve("/keep/two.png").await.unwrap().unwrap();
    assert_eq!(restored.id, two.id);
    assert_eq!(restored.hash, two.hash);
}

#[tokio::test]
async fn restore_replaces_rows_not_merges() {
    let env = test_env().await;
    env.files
        .save(Bytes::from_static(b"old"), "/old.bin")
        .await
        .unwrap();
    let snapshot = env.snapshots.export().await.unwrap();

    env.files
        .save(Bytes::from_static(b"extra"), "/extra.bin")
        .await
        .unwrap();
    env.snapshots.restore(&snapshot).await.unwrap();

    assert!(env.tree.resolve("/old.bin").await.unwrap().is_some());
    // Rows created after the snapshot are gone.
    assert!(env.tree.resolve("/extra.bin").await.unwrap().is_none());
}

#[tokio::test]
async fn newer_snapshot_versions_are_rejected() {
    let env = test_env().await;
    let mut snapshot = NodeSnapshot::new(Vec::new());
    snapshot.version += 1;

    let err = env.snapshots.restore(&snapshot).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
}

#[tokio::test]
async fn snapshots_persist_through_the_remote_store() {
    let env = test_env().await;
    env.files
        .save(Bytes::from_static(b"persisted"), "/gallery/pic.png")
        .await
        .unwrap();

    env.snapshots.store("2026-08-06.json").await.unwrap();
    let listed = env.snapshots.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "2026-08-06.json");

    // Wipe the table, then load the stored snapshot back.
    env.tree
        .delete(&["/gallery".to_string()], true)
        .await
        .unwrap();
    env.snapshots.load("2026-08-06.json").await.unwrap();
    assert!(env.tree.resolve("/gallery/pic.png").await.unwrap().is_some());

    env.snapshots.delete("2026-08-06.json").await.unwrap();
    assert!(env.snapshots.list().await.unwrap().is_empty());
}
