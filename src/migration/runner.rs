use crate::config::Config;
use crate::error::{MigrateError, Result};
use crate::migration::{checksum, registry, render, Direction, Migration};
use crate::schema::{qualified, quote_ident, SchemaManager};
use chrono::{DateTime, Utc};
use deadpool_postgres::{Object, Pool};
use serde::Serialize;
use std::collections::HashSet;
use tokio_postgres::Transaction;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct AppliedMigration {
    pub name: String,
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    pub name: String,
    pub registered: bool,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
    /// `None` until applied; `Some(false)` means the migration changed after it ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum_matches: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedMigration {
    pub name: String,
    pub direction: Direction,
    pub statements: Vec<String>,
}

pub struct MigrationRunner {
    migrations: Vec<Box<dyn Migration>>,
    schema: String,
    table: String,
    database: String,
}

impl MigrationRunner {
    /// Sorts `migrations` by name and rejects duplicate names or unusable identifiers.
    pub fn new(
        mut migrations: Vec<Box<dyn Migration>>,
        schema: &str,
        table: &str,
        database: &str,
    ) -> Result<Self> {
        quote_ident(schema)?;
        quote_ident(table)?;

        migrations.sort_by(|a, b| a.name().cmp(b.name()));

        let mut seen = HashSet::new();
        for migration in &migrations {
            if !seen.insert(migration.name().to_string()) {
                return Err(MigrateError::DuplicateMigration {
                    name: migration.name().to_string(),
                });
            }
        }

        Ok(Self {
            migrations,
            schema: schema.to_string(),
            table: table.to_string(),
            database: database.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            registry(),
            &config.schema,
            &config.migrations_table,
            &config.database_name(),
        )
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn migration_names(&self) -> Vec<&str> {
        self.migrations.iter().map(|m| m.name()).collect()
    }

    fn tracking_table(&self) -> Result<String> {
        qualified(&self.schema, &self.table)
    }

    fn find(&self, name: &str) -> Option<&dyn Migration> {
        self.migrations
            .iter()
            .find(|m| m.name() == name)
            .map(|m| m.as_ref())
    }

    async fn client(&self, pool: &Pool) -> Result<Object> {
        pool.get().await.map_err(|e| MigrateError::ConnectionFailed {
            database: self.database.clone(),
            cause: e.to_string(),
        })
    }

    fn tracking_err(&self, migration: &str) -> impl Fn(tokio_postgres::Error) -> MigrateError {
        let database = self.database.clone();
        let migration = migration.to_string();
        move |source| MigrateError::TrackingFailed {
            database: database.clone(),
            migration: migration.clone(),
            source,
        }
    }

    pub async fn ensure_tracking_table(&self, pool: &Pool) -> Result<()> {
        let mut client = self.client(pool).await?;
        let table = self.tracking_table()?;
        let on_err = self.tracking_err(&format!("{} table creation", self.table));

        let tx = client.transaction().await.map_err(&on_err)?;
        Self::lock_tracking_table(&tx, &table)
            .await
            .map_err(&on_err)?;
        tx.batch_execute(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id SERIAL PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                checksum TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            table
        ))
        .await
        .map_err(&on_err)?;
        tx.commit().await.map_err(&on_err)?;

        Ok(())
    }

    /// Serializes runners sharing `table` until the transaction ends.
    async fn lock_tracking_table(
        tx: &Transaction<'_>,
        table: &str,
    ) -> std::result::Result<(), tokio_postgres::Error> {
        tx.execute("SELECT pg_advisory_xact_lock(hashtext($1))", &[&table])
            .await
            .map(|_| ())
    }

    /// Applied migrations, oldest first.
    pub async fn applied(&self, pool: &Pool) -> Result<Vec<AppliedMigration>> {
        self.ensure_tracking_table(pool).await?;

        let client = self.client(pool).await?;
        let sql = format!(
            "SELECT name, checksum, applied_at FROM {} ORDER BY id",
            self.tracking_table()?
        );
        let rows = client
            .query(sql.as_str(), &[])
            .await
            .map_err(self.tracking_err("query applied migrations"))?;

        Ok(rows
            .iter()
            .map(|row| AppliedMigration {
                name: row.get(0),
                checksum: row.get(1),
                applied_at: row.get(2),
            })
            .collect())
    }

    /// Apply every registered migration not yet recorded, each in its own
    /// transaction. Stops at the first failure; earlier migrations stay applied.
    pub async fn apply_pending(&self, pool: &Pool) -> Result<Vec<String>> {
        let applied = self.applied(pool).await?;
        debug!(
            "Database {} has {} applied migrations",
            self.database,
            applied.len()
        );

        for record in &applied {
            match self.find(&record.name) {
                Some(migration) => {
                    let expected = checksum(migration, &self.schema).await?;
                    if expected != record.checksum {
                        warn!(
                            "Checksum mismatch for migration {} in {}: stored={}, expected={}",
                            record.name, self.database, record.checksum, expected
                        );
                    }
                }
                None => warn!(
                    "Migration {} is recorded in {} but not registered",
                    record.name, self.database
                ),
            }
        }

        let done: HashSet<&str> = applied.iter().map(|a| a.name.as_str()).collect();
        let mut newly_applied = Vec::new();

        for migration in &self.migrations {
            if done.contains(migration.name()) {
                debug!("Skipping already applied migration: {}", migration.name());
                continue;
            }

            info!("Applying migration: {} to {}", migration.name(), self.database);
            let sum = checksum(migration.as_ref(), &self.schema).await?;
            let ran = self
                .run_in_transaction(pool, migration.as_ref(), Direction::Up, Some(&sum))
                .await?;
            if !ran {
                info!(
                    "Migration {} was applied concurrently, skipping",
                    migration.name()
                );
                continue;
            }

            info!(
                "Successfully applied migration: {} (checksum: {})",
                migration.name(),
                sum
            );
            newly_applied.push(migration.name().to_string());
        }

        Ok(newly_applied)
    }

    /// Reverse the `steps` most recently applied migrations, newest first.
    pub async fn rollback(&self, pool: &Pool, steps: usize) -> Result<Vec<String>> {
        if steps == 0 {
            return Err(MigrateError::InvalidRequest {
                message: "steps must be at least 1".to_string(),
            });
        }

        let applied = self.applied(pool).await?;
        if applied.is_empty() {
            return Err(MigrateError::NothingToRollback {
                database: self.database.clone(),
            });
        }

        let mut reverted = Vec::new();

        for record in applied.iter().rev().take(steps) {
            let migration =
                self.find(&record.name)
                    .ok_or_else(|| MigrateError::UnknownMigration {
                        name: record.name.clone(),
                    })?;

            info!("Reverting migration: {} in {}", record.name, self.database);
            let ran = self
                .run_in_transaction(pool, migration, Direction::Down, None)
                .await?;
            if !ran {
                info!(
                    "Migration {} was reverted concurrently, skipping",
                    record.name
                );
                continue;
            }
            info!("Successfully reverted migration: {}", record.name);

            reverted.push(record.name.clone());
        }

        Ok(reverted)
    }

    /// Registered migrations in order, followed by any recorded names this build does not know.
    pub async fn status(&self, pool: &Pool) -> Result<Vec<MigrationStatus>> {
        let applied = self.applied(pool).await?;
        let mut statuses = Vec::with_capacity(self.migrations.len());

        for migration in &self.migrations {
            let record = applied.iter().find(|a| a.name == migration.name());
            let checksum_matches = match record {
                Some(r) => Some(checksum(migration.as_ref(), &self.schema).await? == r.checksum),
                None => None,
            };

            statuses.push(MigrationStatus {
                name: migration.name().to_string(),
                registered: true,
                applied: record.is_some(),
                applied_at: record.map(|r| r.applied_at),
                checksum_matches,
            });
        }

        for record in applied.iter().filter(|a| self.find(&a.name).is_none()) {
            statuses.push(MigrationStatus {
                name: record.name.clone(),
                registered: false,
                applied: true,
                applied_at: Some(record.applied_at),
                checksum_matches: None,
            });
        }

        Ok(statuses)
    }

    /// Rendered DDL for every registered migration, in the order the direction would run them.
    pub async fn plan(&self, direction: Direction) -> Result<Vec<PlannedMigration>> {
        let mut planned = Vec::with_capacity(self.migrations.len());

        for migration in &self.migrations {
            planned.push(PlannedMigration {
                name: migration.name().to_string(),
                direction,
                statements: render(migration.as_ref(), &self.schema, direction).await?,
            });
        }

        if direction == Direction::Down {
            planned.reverse();
        }

        Ok(planned)
    }

    /// One migration step and its tracking-row change, committed together.
    /// Dropping the transaction on an error rolls everything back.
    ///
    /// Runners sharing a tracking table serialize on an advisory lock keyed by
    /// its name, then re-read the row. Returns `false` when another runner
    /// already moved this migration in `direction`.
    async fn run_in_transaction(
        &self,
        pool: &Pool,
        migration: &dyn Migration,
        direction: Direction,
        checksum: Option<&str>,
    ) -> Result<bool> {
        let name = migration.name();
        let table = self.tracking_table()?;
        let mut client = self.client(pool).await?;

        let tx = client
            .transaction()
            .await
            .map_err(self.tracking_err(name))?;

        Self::lock_tracking_table(&tx, &table)
            .await
            .map_err(self.tracking_err(name))?;

        let sql = format!("SELECT EXISTS (SELECT 1 FROM {} WHERE name = $1)", table);
        let recorded: bool = tx
            .query_one(sql.as_str(), &[&name])
            .await
            .map_err(self.tracking_err(name))?
            .get(0);

        let already_done = match direction {
            Direction::Up => recorded,
            Direction::Down => !recorded,
        };
        if already_done {
            debug!("Migration {} already {} in {}", name, direction, self.database);
            return Ok(false);
        }

        {
            let manager = SchemaManager::new(&tx, &self.schema, &self.database, name);
            match direction {
                Direction::Up => migration.up(&manager).await?,
                Direction::Down => migration.down(&manager).await?,
            }
        }

        match direction {
            Direction::Up => {
                let sql = format!("INSERT INTO {} (name, checksum) VALUES ($1, $2)", table);
                tx.execute(sql.as_str(), &[&name, &checksum.unwrap_or_default()])
                    .await
                    .map_err(self.tracking_err(name))?;
            }
            Direction::Down => {
                let sql = format!("DELETE FROM {} WHERE name = $1", table);
                tx.execute(sql.as_str(), &[&name])
                    .await
                    .map_err(self.tracking_err(name))?;
            }
        }

        tx.commit().await.map_err(self.tracking_err(name))?;
        Ok(true)
    }
}
