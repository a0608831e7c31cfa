//! Concurrent access to one shared manager.

use project_db::DatabaseManager;
use project_db::config::Settings;
use project_db::models::{BackendId, BackendSelector};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

const CALLERS: usize = 16;

fn shared(dir: &TempDir) -> Arc<DatabaseManager> {
    let settings = Settings::embedded_only(dir.path().join("shared.db").to_string_lossy());
    Arc::new(DatabaseManager::new(settings))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_engine_built_once_under_contention() {
    let dir = TempDir::new().unwrap();
    let db = shared(&dir);

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let db = Arc::clone(&db);
            tokio::spawn(async move {
                db.get_engine(BackendSelector::Backend(BackendId::Fallback))
                    .await
                    .map(|engine| engine.backend())
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), BackendId::Fallback);
    }
    assert_eq!(db.pool().constructions(BackendId::Fallback), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_record_every_sample() {
    let dir = TempDir::new().unwrap();
    let db = shared(&dir);

    let handles: Vec<_> = (0..CALLERS)
        .map(|i| {
            let db = Arc::clone(&db);
            tokio::spawn(async move { db.execute_scalar("SELECT ?", &[(i as i64).into()]).await })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.unwrap(), Some(json!(i)));
    }

    let stats = db.stats();
    assert_eq!(stats.aggregate.total_queries, CALLERS as u64);
    assert_eq!(stats.aggregate.failed_queries, 0);
    assert_eq!(db.pool().constructions(BackendId::Fallback), 1);
}
