#![cfg(feature = "sqlite")]

use sql_fluent::prelude::*;
use tempfile::tempdir;

#[tokio::test]
async fn unknown_provider_is_an_error_not_a_panic() {
    let registry = ProviderRegistry::new();
    let err = registry.open("nope", "sqlite3", "x.db").await.unwrap_err();
    assert!(matches!(err, SqlFluentError::ProviderNotFound(ref name) if name == "nope"));
}

#[tokio::test]
async fn provider_rejects_foreign_driver() {
    let registry = ProviderRegistry::new();
    sql_fluent::sqlite::register(&registry).unwrap();
    let err = registry.open("sqlite", "postgres", "x.db").await.unwrap_err();
    assert!(matches!(err, SqlFluentError::ConfigError(_)));
    assert!(matches!(
        sql_fluent::sqlite::register(&registry),
        Err(SqlFluentError::ProviderAlreadyRegistered(_))
    ));
}

#[tokio::test]
async fn global_registry_opens_from_config() -> Result<(), SqlFluentError> {
    sql_fluent::sqlite::register_global()?;
    let dir = tempdir().expect("tempdir");
    let config = Config {
        database: dir.path().join("global.db").to_string_lossy().into_owned(),
        ..Config::default()
    };
    let dsn = config.dsn(Driver::Sqlite3.as_str())?;
    let db = open("sqlite", "sqlite3", &dsn).await?;
    assert_eq!(db.provider_name(), "sqlite");
    assert_eq!(db.driver_name(), "sqlite3");

    let cx = Context::background();
    db.ping(&cx).await?;
    db.set_max_open_conns(2);
    db.set_max_idle_conns(1);
    db.ping(&cx).await?;
    db.close().await?;
    assert!(matches!(
        db.ping(&cx).await,
        Err(SqlFluentError::ConnectionError(_))
    ));
    Ok(())
}

#[tokio::test]
async fn memory_database_keeps_state_on_its_single_connection() -> Result<(), SqlFluentError> {
    let registry = ProviderRegistry::new();
    sql_fluent::sqlite::register(&registry)?;
    let db = registry.open("sqlite", "sqlite", ":memory:").await?;
    let cx = Context::background();
    db.exec(&cx, "CREATE TABLE t (id INTEGER PRIMARY KEY)", ()).await?;
    db.set_max_open_conns(4);
    db.exec(&cx, "INSERT INTO t (id) VALUES (?1)", 1).await?;
    assert_eq!(db.table("t").count(&cx).await?, 1);
    Ok(())
}
