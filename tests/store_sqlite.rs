//! Exercises `SqliteStore::connect` against a real file on disk rather than
//! the in-memory pool the unit tests use, the way `runtimes_runner.rs`
//! exercises the checkpointer against a `tempfile::tempdir()`-backed path.

use serde_json::json;
use watchit_core::SqliteStore;

#[tokio::test]
async fn connect_runs_migrations_against_a_file_backed_database() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("watchit.sqlite3");
    let store = SqliteStore::connect(db_path.to_str().unwrap(), None).await.unwrap();

    let event = store
        .insert_event("child-1", 1_000, "navigation", Some("https://example.com"), Some("t"), None, None, &json!({}))
        .await
        .unwrap();
    assert_eq!(event.child_id, "child-1");

    let reopened = SqliteStore::connect(db_path.to_str().unwrap(), None).await.unwrap();
    let fetched = reopened.get_event(&event.id).await.unwrap();
    assert_eq!(fetched.id, event.id);
}
