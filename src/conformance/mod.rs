//! Behavioral suite any registered provider must pass.
//!
//! ```rust,no_run
//! # async fn demo() {
//! use sql_fluent::conformance::ConformanceSuite;
//! use sql_fluent::registry::ProviderRegistry;
//!
//! let registry = ProviderRegistry::new();
//! sql_fluent::sqlite::register(&registry).unwrap();
//! ConformanceSuite::new(&registry, "sqlite", "sqlite3")
//!     .run("/tmp/conformance.db")
//!     .await;
//! # }
//! ```
//!
//! The suite expects an empty database and panics on the first violated expectation.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::Context;
use crate::error::SqlFluentError;
use crate::record::Record;
use crate::registry::ProviderRegistry;
use crate::results::Cursor;
use crate::session::{Db, Queryable};
use crate::types::RowValues;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestRow {
    pub id: i64,
    pub data: String,
    pub person_id: i64,
}

impl Record for TestRow {
    fn set_primary_key(&mut self, id: i64) {
        self.id = id;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonRow {
    pub id: i64,
    pub name: String,
    pub created_at: NaiveDateTime,
}

impl Record for PersonRow {
    fn set_primary_key(&mut self, id: i64) {
        self.id = id;
    }
}

type Outcome = Result<(), SqlFluentError>;

fn at(hour: u32, min: u32, sec: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2017, 6, 10)
        .and_then(|d| d.and_hms_opt(hour, min, sec))
        .unwrap_or_default()
}

fn row(id: i64, data: &str, person_id: i64) -> TestRow {
    TestRow {
        id,
        data: data.to_string(),
        person_id,
    }
}

async fn fetch_row(
    cx: &Context,
    runner: &impl Queryable,
    id: i64,
) -> Result<TestRow, SqlFluentError> {
    runner
        .table("test")
        .where_eq("id", id)
        .single(cx)
        .await?
        .scan_record()
}

async fn all_rows(
    query: impl Future<Output = Result<Cursor, SqlFluentError>>,
) -> Result<Vec<TestRow>, SqlFluentError> {
    query.await?.scan_all().await
}

/// Runs the scenarios against one provider/driver pair.
pub struct ConformanceSuite<'a> {
    registry: &'a ProviderRegistry,
    provider: String,
    driver: String,
    cx: Context,
}

impl<'a> ConformanceSuite<'a> {
    #[must_use]
    pub fn new(registry: &'a ProviderRegistry, provider: &str, driver: &str) -> Self {
        Self {
            registry,
            provider: provider.to_string(),
            driver: driver.to_string(),
            cx: Context::background(),
        }
    }

    /// Open `dsn` and run every scenario in order.
    ///
    /// # Panics
    ///
    /// Panics naming the scenario whose expectation failed.
    pub async fn run(&self, dsn: &str) {
        let db = match self.setup(dsn).await {
            Ok(db) => db,
            Err(err) => panic!("conformance setup failed: {err}"),
        };
        self.step("create", self.create(&db).await);
        self.step("join", self.join(&db).await);
        self.step("where", self.where_family(&db).await);
        self.step("select", self.select(&db).await);
        self.step("update", self.update(&db).await);
        self.step("delete", self.delete(&db).await);
        self.step("transactions", self.transactions(&db).await);
        self.step("rows", self.rows(&db).await);
        self.step("misc", self.misc(&db).await);
    }

    fn step(&self, name: &str, outcome: Outcome) {
        if let Err(err) = outcome {
            panic!("conformance scenario `{name}` failed: {err}");
        }
        info!(provider = %self.provider, scenario = name, "conformance scenario passed");
    }

    async fn setup(&self, dsn: &str) -> Result<Db, SqlFluentError> {
        let db = self.registry.open(&self.provider, &self.driver, dsn).await?;
        db.exec(
            &self.cx,
            "CREATE TABLE test (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                data VARCHAR(80),
                person_id INTEGER NULL
            )",
            (),
        )
        .await?;
        db.exec(
            &self.cx,
            "CREATE TABLE person (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(80),
                created_at TIMESTAMP
            )",
            (),
        )
        .await?;
        Ok(db)
    }

    async fn create(&self, db: &Db) -> Outcome {
        let cx = &self.cx;

        let mut first = row(0, "The quick brown fox jumps over the lazy dog", 0);
        db.table("test").create_one(cx, &mut first).await?;
        assert_eq!(db.table("test").count(cx).await?, 1, "count after single insert");
        assert_eq!(first.id, 1, "generated key copied back");
        let reread: TestRow = db.table("test").single(cx).await?.scan_record()?;
        assert_eq!(reread, first);

        let mut bulk = vec![
            row(0, "アフターファイブでイケイケ", 0),
            row(0, "666 666 6666666", 0),
            row(0, "Boeing 777-300ER", 0),
        ];
        let inserted = db.table("test").create(cx, &mut bulk).await?;
        assert_eq!(inserted, 3);
        assert_eq!(db.table("test").count(cx).await?, 4, "count after bulk insert");

        let newest_first = all_rows(
            db.table("test").where_("id > ?", 1).order_by(["id DESC"]).all(cx),
        )
        .await?;
        assert_eq!(newest_first.len(), 3);
        for (i, found) in newest_first.iter().enumerate() {
            assert_eq!(found.id, 4 - i64::try_from(i).unwrap_or_default());
            assert_eq!(found.data, bulk[2 - i].data);
        }
        Ok(())
    }

    async fn join(&self, db: &Db) -> Outcome {
        let cx = &self.cx;
        let mut people = vec![
            PersonRow {
                name: "acidlemon".into(),
                created_at: at(16, 40, 50),
                ..PersonRow::default()
            },
            PersonRow {
                name: "macopy".into(),
                created_at: at(17, 30, 40),
                ..PersonRow::default()
            },
            PersonRow {
                name: "unused".into(),
                created_at: at(18, 20, 30),
                ..PersonRow::default()
            },
        ];
        db.table("person").create(cx, &mut people).await?;
        assert_eq!(people[2].id, 3);

        let mut rows = vec![
            row(100, "acidlemon-test", 1),
            row(101, "macopy-test", 2),
            row(102, "null", 0),
            row(103, "acidlemon-test2", 1),
        ];
        db.table("test").create(cx, &mut rows).await?;

        let inner = all_rows(
            db.table("test")
                .join("person", "test.person_id = person.id")
                .where_("test.id >= ?", 100)
                .order_by(["test.id"])
                .all(cx),
        )
        .await?;
        assert_eq!(inner.len(), 3, "inner join drops the unmatched row");

        let left = all_rows(
            db.table("test")
                .left_join("person", "test.person_id = person.id")
                .where_("test.id >= ?", 100)
                .order_by(["test.id"])
                .all(cx),
        )
        .await?;
        assert_eq!(left.len(), 4, "left join keeps the unmatched row");

        let acidlemon: PersonRow = db.table("person").where_eq("id", 1).single(cx).await?.scan_record()?;
        assert_eq!(acidlemon.created_at, at(16, 40, 50));
        Ok(())
    }

    async fn where_family(&self, db: &Db) -> Outcome {
        let cx = &self.cx;
        let test = db.table("test");

        let eq = all_rows(test.where_eq("data", "acidlemon-test").all(cx)).await?;
        assert_eq!(eq.len(), 1);

        let like = all_rows(test.where_like("data", "acidlemon-test%").all(cx)).await?;
        assert_eq!(like.len(), 2);

        for ids in [test.where_in("id", 100), test.where_in("id", vec![100])] {
            assert_eq!(all_rows(ids.all(cx)).await?.len(), 1);
        }
        for ids in [
            test.where_in("id", (1, 2, 100, 40000)),
            test.where_in("id", vec![1, 2, 100, 40000]),
        ] {
            assert_eq!(all_rows(ids.all(cx)).await?.len(), 3);
        }

        let between = all_rows(test.where_between("id", 100, 105).all(cx)).await?;
        assert_eq!(between.len(), 4, "between is inclusive of sparse ranges");

        for single in [
            test.where_("data = ?", "acidlemon-test"),
            test.where_("data = ?", vec!["acidlemon-test"]),
        ] {
            assert_eq!(all_rows(single.all(cx)).await?.len(), 1);
        }
        for multi in [
            test.where_("data = ? AND id = ?", ("acidlemon-test", 100)),
            test.where_(
                "data = ? AND id = ?",
                vec![RowValues::from("acidlemon-test"), RowValues::from(100)],
            ),
        ] {
            assert_eq!(all_rows(multi.all(cx)).await?.len(), 1);
        }

        let missing = test.where_eq("id", 40000).single(cx).await?;
        let err = missing.scan_record::<TestRow>().map(|_| ()).err();
        assert!(
            err.as_ref().is_some_and(SqlFluentError::is_not_found),
            "single over zero rows must be NotFound, got {err:?}"
        );
        Ok(())
    }

    async fn select(&self, db: &Db) -> Outcome {
        let cx = &self.cx;
        let (data, person_id): (String, i64) = db
            .table("test")
            .select(["data", "person_id"])
            .where_eq("id", 100)
            .single(cx)
            .await?
            .scan()?;
        assert_eq!(data, "acidlemon-test");
        assert_eq!(person_id, 1);

        let mut cursor = db
            .table("test")
            .where_("id >= ?", 100)
            .fetch_column(cx, "data")
            .await?;
        assert!(cursor.is_pluck());
        let plucked: Vec<String> = cursor.scan_all().await?;
        assert_eq!(
            plucked,
            ["acidlemon-test", "macopy-test", "null", "acidlemon-test2"]
        );
        Ok(())
    }

    async fn update(&self, db: &Db) -> Outcome {
        let cx = &self.cx;

        let mut existing = fetch_row(cx, db, 100).await?;
        existing.data = "updated acidlemon-test".into();
        db.table("test").update_record(cx, &existing).await?;
        assert_eq!(fetch_row(cx, db, 100).await?.data, existing.data);

        let fresh = TestRow {
            data: "new-struct acidlemon-test".into(),
            person_id: 1,
            ..TestRow::default()
        };
        db.table("test").where_eq("id", 100).update_record(cx, &fresh).await?;
        assert_eq!(fetch_row(cx, db, 100).await?.data, fresh.data);

        let changes = HashMap::from([("data", "map acidlemon-test")]);
        let affected = db.table("test").where_eq("id", 100).update(cx, changes).await?;
        assert_eq!(affected, 1);
        assert_eq!(fetch_row(cx, db, 100).await?.data, "map acidlemon-test");
        Ok(())
    }

    async fn delete(&self, db: &Db) -> Outcome {
        let cx = &self.cx;
        let doomed = fetch_row(cx, db, 100).await?;
        let affected = db.table("test").delete_record(cx, &doomed).await?;
        assert_eq!(affected, 1);
        let gone = fetch_row(cx, db, 100).await;
        assert!(
            gone.as_ref().is_err_and(SqlFluentError::is_not_found),
            "deleted row still readable: {gone:?}"
        );
        Ok(())
    }

    async fn transactions(&self, db: &Db) -> Outcome {
        let cx = &self.cx;
        let committed = "transaction-commit macopy-test";

        let tx = db.begin(cx).await?;
        let mut inside = fetch_row(cx, &tx, 101).await?;
        inside.data = committed.into();
        tx.table("test").update_record(cx, &inside).await?;
        assert_ne!(fetch_row(cx, db, 101).await?.data, committed, "dirty read before commit");
        tx.commit(cx).await?;
        assert_eq!(fetch_row(cx, db, 101).await?.data, committed);

        let discarded = db.begin(cx).await?;
        let mut inside = fetch_row(cx, &discarded, 101).await?;
        inside.data = "transaction-rollback macopy-test".into();
        discarded.table("test").update_record(cx, &inside).await?;
        assert_eq!(fetch_row(cx, db, 101).await?.data, committed, "dirty read before rollback");
        discarded.rollback(cx).await?;
        assert_eq!(fetch_row(cx, db, 101).await?.data, committed, "rollback restores the update");

        let tx = db.begin(cx).await?;
        let victim = fetch_row(cx, &tx, 101).await?;
        tx.table("test").delete_record(cx, &victim).await?;
        assert_eq!(fetch_row(cx, db, 101).await?.id, 101, "delete visible before commit");
        tx.rollback(cx).await?;
        assert_eq!(fetch_row(cx, db, 101).await?.id, 101, "rollback restores the row");

        let reuse = tx.table("test").count(cx).await;
        assert!(
            matches!(reuse, Err(SqlFluentError::TransactionStateError(_))),
            "finalized transaction accepted a query: {reuse:?}"
        );
        Ok(())
    }

    async fn rows(&self, db: &Db) -> Outcome {
        let cx = &self.cx;
        let mut cursor = db
            .table("test")
            .where_("id >= ?", 100)
            .order_by(["id DESC"])
            .all(cx)
            .await?;
        assert_eq!(cursor.columns(), ["id", "data", "person_id"]);

        let expected = [
            row(103, "acidlemon-test2", 1),
            row(102, "null", 0),
            row(101, "transaction-commit macopy-test", 2),
        ];
        let mut scanned = 0;
        while cursor.next().await? {
            let (id, data, person_id): (i64, String, i64) = cursor.scan()?;
            if let Some(want) = expected.get(scanned) {
                assert_eq!(&row(id, &data, person_id), want);
            }
            scanned += 1;
        }
        assert_eq!(scanned, 3, "positional scan count");
        cursor.close().await?;
        Ok(())
    }

    async fn misc(&self, db: &Db) -> Outcome {
        let cx = &self.cx;
        assert_eq!(db.provider_name(), self.provider);
        db.ping(cx).await?;
        db.set_max_idle_conns(10);
        db.set_max_open_conns(10);
        assert_eq!(db.driver_name(), self.driver);
        db.ping(cx).await?;
        db.close().await?;
        let after_close = db.ping(cx).await;
        assert!(
            matches!(after_close, Err(SqlFluentError::ConnectionError(_))),
            "closed session still answered ping: {after_close:?}"
        );
        Ok(())
    }
}
