#![cfg(feature = "sqlite")]

use std::time::Duration;

use sql_fluent::prelude::*;
use tempfile::tempdir;

async fn open_db(dir: &tempfile::TempDir) -> Result<Db, SqlFluentError> {
    let registry = ProviderRegistry::new();
    sql_fluent::sqlite::register(&registry)?;
    let path = dir.path().join("cancel.db");
    registry
        .open("sqlite", "sqlite3", &path.to_string_lossy())
        .await
}

#[tokio::test]
async fn cancelled_context_stops_before_the_backend() -> Result<(), SqlFluentError> {
    let dir = tempdir().expect("tempdir");
    let db = open_db(&dir).await?;
    let cx = Context::background();
    db.exec(&cx, "CREATE TABLE t (id INTEGER PRIMARY KEY)", ()).await?;

    let cancelled = cx.child();
    cancelled.cancel();
    let err = db
        .exec(&cancelled, "INSERT INTO t (id) VALUES (?1)", 1)
        .await
        .unwrap_err();
    assert!(matches!(err, SqlFluentError::Cancelled));
    assert!(!cx.is_cancelled());
    assert_eq!(db.table("t").count(&cx).await?, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deadline_interrupts_a_long_query() -> Result<(), SqlFluentError> {
    let dir = tempdir().expect("tempdir");
    let db = open_db(&dir).await?;
    let cx = Context::background().with_timeout(Duration::from_millis(50));
    let endless = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
                   SELECT COUNT(*) FROM c";
    let err = db.query(&cx, endless, ()).await.unwrap_err();
    assert!(matches!(err, SqlFluentError::DeadlineExceeded), "{err}");

    // the interrupted connection is usable again
    db.ping(&Context::background()).await?;
    Ok(())
}
