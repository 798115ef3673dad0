//! End-to-end checks against a real PostgreSQL server.
//!
//! Ignored by default. Point `TEST_DATABASE_URL` at a server and run
//! `cargo test -- --ignored`; each test works in its own throw-away schema so
//! they can run in parallel.

use deadpool_postgres::Pool;
use signup_migrator::error::MigrateError;
use signup_migrator::migration::{registry, timeslot, MigrationRunner};
use signup_migrator::pool::create_pool;
use signup_migrator::schema::SchemaInspector;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio_postgres::error::SqlState;
use tokio_test::{assert_err, assert_ok};

const SLOT_A: &str = "00000000-0000-0000-0000-00000000000a";
const SLOT_B: &str = "00000000-0000-0000-0000-00000000000b";
const MISSING_SLOT: &str = "00000000-0000-0000-0000-0000000000ff";

static COUNTER: AtomicUsize = AtomicUsize::new(0);

struct TestDb {
    pool: Pool,
    schema: String,
    runner: MigrationRunner,
}

impl TestDb {
    async fn exec(&self, sql: &str) -> Result<(), tokio_postgres::Error> {
        let client = self.pool.get().await.unwrap();
        client.batch_execute(sql).await
    }

    async fn count_signups(&self) -> i64 {
        let client = self.pool.get().await.unwrap();
        let sql = format!("SELECT COUNT(*) FROM \"{}\".performer_signups", self.schema);
        client.query_one(sql.as_str(), &[]).await.unwrap().get(0)
    }

    async fn teardown(self) {
        let sql = format!("DROP SCHEMA \"{}\" CASCADE", self.schema);
        self.exec(&sql).await.unwrap();
    }
}

const NEEDS_DB: &str = "needs a PostgreSQL server in TEST_DATABASE_URL";

async fn setup() -> TestDb {
    let url = std::env::var("TEST_DATABASE_URL").expect(NEEDS_DB);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .subsec_nanos();
    let schema = format!(
        "signup_test_{}_{}_{}",
        std::process::id(),
        nanos,
        COUNTER.fetch_add(1, Ordering::SeqCst)
    );

    let pool = create_pool(&url, 4).unwrap();
    let client = pool.get().await.unwrap();
    client
        .batch_execute(&format!(
            r#"
            CREATE SCHEMA "{s}";
            CREATE TABLE "{s}".timeslots (
                id UUID PRIMARY KEY,
                starts_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE TABLE "{s}".performer_signups (
                id UUID PRIMARY KEY,
                performer_name TEXT NOT NULL
            );
            "#,
            s = schema
        ))
        .await
        .unwrap();
    drop(client);

    let runner = MigrationRunner::new(registry(), &schema, "_schema_migrations", "test").unwrap();

    TestDb {
        pool,
        schema,
        runner,
    }
}

#[tokio::test]
#[ignore = "needs a PostgreSQL server in TEST_DATABASE_URL"]
async fn forward_then_reverse_restores_schema() {
    let db = setup().await;
    let client = db.pool.get().await.unwrap();

    let before = SchemaInspector::snapshot(&client, &db.schema, timeslot::TABLE)
        .await
        .unwrap();
    assert!(before.column(timeslot::COLUMN).is_none());

    let applied = assert_ok!(db.runner.apply_pending(&db.pool).await);
    assert_eq!(applied, vec![timeslot::NAME.to_string()]);

    let after_up = SchemaInspector::snapshot(&client, &db.schema, timeslot::TABLE)
        .await
        .unwrap();
    let column = after_up.column(timeslot::COLUMN).unwrap();
    assert_eq!(column.data_type, "uuid");
    assert!(column.is_nullable);

    let fk = after_up.constraint(timeslot::FOREIGN_KEY).unwrap();
    assert_eq!(fk.kind, "f");
    assert!(fk.definition.contains("timeslots(id)"));
    assert!(fk.definition.contains("ON DELETE CASCADE"));

    let index = after_up.index(timeslot::INDEX).unwrap();
    assert!(index.definition.contains("(timeslot_id)"));

    let reverted = assert_ok!(db.runner.rollback(&db.pool, 1).await);
    assert_eq!(reverted, vec![timeslot::NAME.to_string()]);

    let after_down = SchemaInspector::snapshot(&client, &db.schema, timeslot::TABLE)
        .await
        .unwrap();
    assert_eq!(before, after_down);

    let status = db.runner.status(&db.pool).await.unwrap();
    assert!(!status[0].applied);

    drop(client);
    db.teardown().await;
}

#[tokio::test]
#[ignore = "needs a PostgreSQL server in TEST_DATABASE_URL"]
async fn unknown_timeslot_is_rejected() {
    let db = setup().await;
    assert_ok!(db.runner.apply_pending(&db.pool).await);

    let err = db
        .exec(&format!(
            "INSERT INTO \"{}\".performer_signups (id, performer_name, timeslot_id) \
             VALUES ('00000000-0000-0000-0000-000000000001', 'Juggler', '{}')",
            db.schema, MISSING_SLOT
        ))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(&SqlState::FOREIGN_KEY_VIOLATION));

    db.teardown().await;
}

#[tokio::test]
#[ignore = "needs a PostgreSQL server in TEST_DATABASE_URL"]
async fn deleting_timeslot_cascades_and_null_is_allowed() {
    let db = setup().await;
    assert_ok!(db.runner.apply_pending(&db.pool).await);

    let s = &db.schema;
    db.exec(&format!(
        r#"
        INSERT INTO "{s}".timeslots (id) VALUES ('{a}'), ('{b}');
        INSERT INTO "{s}".performer_signups (id, performer_name, timeslot_id) VALUES
            ('00000000-0000-0000-0000-000000000001', 'Poet', '{a}'),
            ('00000000-0000-0000-0000-000000000002', 'Cellist', '{a}'),
            ('00000000-0000-0000-0000-000000000003', 'Comic', '{b}'),
            ('00000000-0000-0000-0000-000000000004', 'Walk-in', NULL);
        "#,
        s = s,
        a = SLOT_A,
        b = SLOT_B
    ))
    .await
    .unwrap();
    assert_eq!(db.count_signups().await, 4);

    db.exec(&format!("DELETE FROM \"{}\".timeslots WHERE id = '{}'", s, SLOT_A))
        .await
        .unwrap();
    assert_eq!(db.count_signups().await, 2);

    db.teardown().await;
}

#[tokio::test]
#[ignore = "needs a PostgreSQL server in TEST_DATABASE_URL"]
async fn reverse_fails_when_objects_already_removed() {
    let db = setup().await;
    assert_ok!(db.runner.apply_pending(&db.pool).await);

    let s = &db.schema;
    db.exec(&format!(
        r#"
        ALTER TABLE "{s}".performer_signups DROP CONSTRAINT {fk};
        DROP INDEX "{s}".{idx};
        ALTER TABLE "{s}".performer_signups DROP COLUMN {col};
        "#,
        s = s,
        fk = timeslot::FOREIGN_KEY,
        idx = timeslot::INDEX,
        col = timeslot::COLUMN
    ))
    .await
    .unwrap();

    let err = assert_err!(db.runner.rollback(&db.pool, 1).await);
    assert!(matches!(err, MigrateError::MigrationFailed { .. }));
    assert_eq!(err.sql_state(), Some(&SqlState::UNDEFINED_OBJECT));

    // The failed transaction left the tracking row in place.
    let status = db.runner.status(&db.pool).await.unwrap();
    assert!(status[0].applied);

    db.teardown().await;
}

#[tokio::test]
#[ignore = "needs a PostgreSQL server in TEST_DATABASE_URL"]
async fn forward_is_applied_once() {
    let db = setup().await;

    assert_eq!(db.runner.apply_pending(&db.pool).await.unwrap().len(), 1);
    assert!(db.runner.apply_pending(&db.pool).await.unwrap().is_empty());

    let status = db.runner.status(&db.pool).await.unwrap();
    assert_eq!(status.len(), 1);
    assert!(status[0].applied);
    assert!(status[0].registered);
    assert_eq!(status[0].checksum_matches, Some(true));

    db.teardown().await;
}

#[tokio::test]
#[ignore = "needs a PostgreSQL server in TEST_DATABASE_URL"]
async fn concurrent_apply_runs_migration_once() {
    let db = setup().await;

    let (first, second) = tokio::join!(
        db.runner.apply_pending(&db.pool),
        db.runner.apply_pending(&db.pool)
    );
    let first = assert_ok!(first);
    let second = assert_ok!(second);
    assert_eq!(first.len() + second.len(), 1);

    let (first, second) = tokio::join!(
        db.runner.rollback(&db.pool, 1),
        db.runner.rollback(&db.pool, 1)
    );
    let reverted: usize = [first, second]
        .into_iter()
        .filter_map(Result::ok)
        .map(|names| names.len())
        .sum();
    assert_eq!(reverted, 1);

    let status = db.runner.status(&db.pool).await.unwrap();
    assert!(!status[0].applied);

    db.teardown().await;
}

#[tokio::test]
#[ignore = "needs a PostgreSQL server in TEST_DATABASE_URL"]
async fn rollback_with_nothing_applied_fails() {
    let db = setup().await;

    let err = assert_err!(db.runner.rollback(&db.pool, 1).await);
    assert!(matches!(err, MigrateError::NothingToRollback { .. }));

    db.teardown().await;
}

#[tokio::test]
#[ignore = "needs a PostgreSQL server in TEST_DATABASE_URL"]
async fn duplicate_column_aborts_without_partial_changes() {
    let db = setup().await;
    db.exec(&format!(
        "ALTER TABLE \"{}\".performer_signups ADD COLUMN timeslot_id UUID",
        db.schema
    ))
    .await
    .unwrap();

    let err = assert_err!(db.runner.apply_pending(&db.pool).await);
    assert_eq!(err.sql_state(), Some(&SqlState::DUPLICATE_COLUMN));

    let client = db.pool.get().await.unwrap();
    let snapshot = SchemaInspector::snapshot(&client, &db.schema, timeslot::TABLE)
        .await
        .unwrap();
    assert!(snapshot.constraint(timeslot::FOREIGN_KEY).is_none());
    assert!(snapshot.index(timeslot::INDEX).is_none());
    drop(client);

    let status = db.runner.status(&db.pool).await.unwrap();
    assert!(!status[0].applied);

    db.teardown().await;
}

#[tokio::test]
#[ignore = "needs a PostgreSQL server in TEST_DATABASE_URL"]
async fn missing_referenced_table_fails() {
    let db = setup().await;
    db.exec(&format!("DROP TABLE \"{}\".timeslots", db.schema))
        .await
        .unwrap();

    let client = db.pool.get().await.unwrap();
    assert!(!SchemaInspector::table_exists(&client, &db.schema, timeslot::REFERENCED_TABLE)
        .await
        .unwrap());
    drop(client);

    let err = assert_err!(db.runner.apply_pending(&db.pool).await);
    assert_eq!(err.sql_state(), Some(&SqlState::UNDEFINED_TABLE));

    db.teardown().await;
}
