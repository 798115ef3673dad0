//! The schema-manipulation handle handed to each migration's `up` and `down`.

use crate::error::{MigrateError, Result};
use crate::schema::builder::{AlterTable, DropIndex, Index};
use std::sync::Mutex;
use tokio_postgres::Transaction;
use tracing::debug;

enum Target<'a> {
    Transaction(&'a Transaction<'a>),
    DryRun(Mutex<Vec<String>>),
}

pub struct SchemaManager<'a> {
    target: Target<'a>,
    schema: String,
    database: String,
    migration: String,
}

impl<'a> SchemaManager<'a> {
    /// Handle that executes every statement on `tx`. Nothing is committed here;
    /// the caller owns the transaction.
    pub fn new(tx: &'a Transaction<'a>, schema: &str, database: &str, migration: &str) -> Self {
        Self {
            target: Target::Transaction(tx),
            schema: schema.to_string(),
            database: database.to_string(),
            migration: migration.to_string(),
        }
    }

    /// Handle that only records rendered statements.
    pub fn dry_run(schema: &str, migration: &str) -> Self {
        Self {
            target: Target::DryRun(Mutex::new(Vec::new())),
            schema: schema.to_string(),
            database: "(dry run)".to_string(),
            migration: migration.to_string(),
        }
    }

    pub async fn alter_table(&self, alter: AlterTable) -> Result<()> {
        let sql = alter.to_sql(&self.schema)?;
        self.run(sql).await
    }

    pub async fn create_index(&self, index: Index) -> Result<()> {
        let sql = index.to_sql(&self.schema)?;
        self.run(sql).await
    }

    pub async fn drop_index(&self, index: DropIndex) -> Result<()> {
        let sql = index.to_sql(&self.schema)?;
        self.run(sql).await
    }

    /// Statements recorded so far. Always empty outside dry-run mode.
    pub fn recorded(&self) -> Vec<String> {
        match &self.target {
            Target::DryRun(log) => log.lock().unwrap_or_else(|e| e.into_inner()).clone(),
            Target::Transaction(_) => Vec::new(),
        }
    }

    async fn run(&self, sql: String) -> Result<()> {
        match &self.target {
            Target::Transaction(tx) => {
                debug!("[{}] {}: {}", self.database, self.migration, sql);
                tx.batch_execute(&sql)
                    .await
                    .map_err(|source| MigrateError::MigrationFailed {
                        database: self.database.clone(),
                        migration: self.migration.clone(),
                        source,
                    })
            }
            Target::DryRun(log) => {
                log.lock().unwrap_or_else(|e| e.into_inner()).push(sql);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::builder::{ColumnDef, ColumnType};

    #[tokio::test]
    async fn test_dry_run_records_in_order() {
        let manager = SchemaManager::dry_run("public", "test");

        manager
            .alter_table(
                AlterTable::new("acts").add_column(ColumnDef::new("venue_id", ColumnType::Uuid)),
            )
            .await
            .unwrap();
        manager
            .create_index(Index::new("acts_venue_id_index", "acts").column("venue_id"))
            .await
            .unwrap();
        manager
            .drop_index(DropIndex::new("acts_venue_id_index"))
            .await
            .unwrap();

        let recorded = manager.recorded();
        assert_eq!(recorded.len(), 3);
        assert!(recorded[0].starts_with("ALTER TABLE \"public\".\"acts\""));
        assert!(recorded[1].starts_with("CREATE INDEX"));
        assert!(recorded[2].starts_with("DROP INDEX"));
    }

    #[tokio::test]
    async fn test_invalid_statement_is_not_recorded() {
        let manager = SchemaManager::dry_run("public", "test");
        let result = manager.alter_table(AlterTable::new("acts")).await;
        assert!(result.is_err());
        assert!(manager.recorded().is_empty());
    }
}
