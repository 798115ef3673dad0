//! Catalog inspection
//!
//! Reads the shape of a single table (columns, constraints, indexes) so a
//! migration's effect can be verified and a forward/reverse round trip can be
//! compared against the starting point.

use crate::error::{MigrateError, Result};
use serde::Serialize;
use tokio_postgres::Client;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConstraintInfo {
    pub name: String,
    /// `p`, `f`, `u`, `c` ... as stored in `pg_constraint.contype`
    pub kind: String,
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub definition: String,
}

/// Everything sorted by name so two snapshots compare structurally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSnapshot {
    pub schema: String,
    pub table: String,
    pub columns: Vec<ColumnInfo>,
    pub constraints: Vec<ConstraintInfo>,
    pub indexes: Vec<IndexInfo>,
}

impl TableSnapshot {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn constraint(&self, name: &str) -> Option<&ConstraintInfo> {
        self.constraints.iter().find(|c| c.name == name)
    }

    pub fn index(&self, name: &str) -> Option<&IndexInfo> {
        self.indexes.iter().find(|i| i.name == name)
    }
}

pub struct SchemaInspector;

impl SchemaInspector {
    pub async fn table_exists(client: &Client, schema: &str, table: &str) -> Result<bool> {
        let row = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM pg_tables WHERE schemaname = $1 AND tablename = $2)",
                &[&schema, &table],
            )
            .await
            .map_err(|source| MigrateError::InspectionFailed {
                table: table.to_string(),
                source,
            })?;

        Ok(row.get(0))
    }

    pub async fn snapshot(client: &Client, schema: &str, table: &str) -> Result<TableSnapshot> {
        let inspect_err = |source| MigrateError::InspectionFailed {
            table: table.to_string(),
            source,
        };

        let columns = client
            .query(
                r#"
                SELECT column_name::text, data_type::text, is_nullable::text, column_default::text
                FROM information_schema.columns
                WHERE table_schema = $1 AND table_name = $2
                ORDER BY column_name
                "#,
                &[&schema, &table],
            )
            .await
            .map_err(inspect_err)?
            .iter()
            .map(|row| {
                let nullable: String = row.get(2);
                ColumnInfo {
                    name: row.get(0),
                    data_type: row.get(1),
                    is_nullable: nullable.eq_ignore_ascii_case("YES"),
                    default: row.get(3),
                }
            })
            .collect();

        let constraints = client
            .query(
                r#"
                SELECT con.conname::text, con.contype::text, pg_get_constraintdef(con.oid)
                FROM pg_constraint con
                JOIN pg_class rel ON rel.oid = con.conrelid
                JOIN pg_namespace nsp ON nsp.oid = rel.relnamespace
                WHERE nsp.nspname = $1 AND rel.relname = $2
                ORDER BY con.conname
                "#,
                &[&schema, &table],
            )
            .await
            .map_err(inspect_err)?
            .iter()
            .map(|row| ConstraintInfo {
                name: row.get(0),
                kind: row.get(1),
                definition: row.get(2),
            })
            .collect();

        let indexes = client
            .query(
                r#"
                SELECT indexname::text, indexdef
                FROM pg_indexes
                WHERE schemaname = $1 AND tablename = $2
                ORDER BY indexname
                "#,
                &[&schema, &table],
            )
            .await
            .map_err(inspect_err)?
            .iter()
            .map(|row| IndexInfo {
                name: row.get(0),
                definition: row.get(1),
            })
            .collect();

        Ok(TableSnapshot {
            schema: schema.to_string(),
            table: table.to_string(),
            columns,
            constraints,
            indexes,
        })
    }
}
