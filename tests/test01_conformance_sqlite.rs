#![cfg(all(feature = "sqlite", feature = "test-utils"))]

use sql_fluent::conformance::ConformanceSuite;
use sql_fluent::registry::ProviderRegistry;
use tempfile::tempdir;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sqlite_provider_passes_conformance() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("conformance.db");

    let registry = ProviderRegistry::new();
    sql_fluent::sqlite::register(&registry).expect("register sqlite");
    ConformanceSuite::new(&registry, "sqlite", "sqlite3")
        .run(&path.to_string_lossy())
        .await;
}
