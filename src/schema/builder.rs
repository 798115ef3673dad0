//! Typed DDL descriptions rendered to PostgreSQL statements.
//!
//! Every identifier is validated and double-quoted, and every table reference
//! is qualified with the target schema, so rendered SQL never depends on the
//! connection's `search_path`.

use crate::error::{MigrateError, Result};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Uuid,
    Text,
    Integer,
    BigInt,
    Boolean,
    TimestampTz,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Uuid => write!(f, "UUID"),
            ColumnType::Text => write!(f, "TEXT"),
            ColumnType::Integer => write!(f, "INTEGER"),
            ColumnType::BigInt => write!(f, "BIGINT"),
            ColumnType::Boolean => write!(f, "BOOLEAN"),
            ColumnType::TimestampTz => write!(f, "TIMESTAMPTZ"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferentialAction {
    Cascade,
    SetNull,
    Restrict,
    NoAction,
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferentialAction::Cascade => write!(f, "CASCADE"),
            ReferentialAction::SetNull => write!(f, "SET NULL"),
            ReferentialAction::Restrict => write!(f, "RESTRICT"),
            ReferentialAction::NoAction => write!(f, "NO ACTION"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
}

impl ColumnDef {
    /// New column, nullable unless `not_null` is called.
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            nullable: true,
        }
    }

    pub fn null(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    fn render(&self) -> Result<String> {
        Ok(format!(
            "{} {} {}",
            quote_ident(&self.name)?,
            self.column_type,
            if self.nullable { "NULL" } else { "NOT NULL" }
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    pub ref_table: String,
    pub ref_columns: Vec<String>,
    pub on_delete: Option<ReferentialAction>,
}

impl ForeignKey {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            ref_table: String::new(),
            ref_columns: Vec::new(),
            on_delete: None,
        }
    }

    pub fn from_column(mut self, column: &str) -> Self {
        self.columns.push(column.to_string());
        self
    }

    pub fn to(mut self, table: &str, column: &str) -> Self {
        self.ref_table = table.to_string();
        self.ref_columns.push(column.to_string());
        self
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    fn render(&self, schema: &str) -> Result<String> {
        if self.columns.is_empty() || self.columns.len() != self.ref_columns.len() {
            return Err(MigrateError::Internal(format!(
                "Foreign key {} has {} local and {} referenced columns",
                self.name,
                self.columns.len(),
                self.ref_columns.len()
            )));
        }

        let mut sql = format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            quote_ident(&self.name)?,
            quote_list(&self.columns)?,
            qualified(schema, &self.ref_table)?,
            quote_list(&self.ref_columns)?
        );
        if let Some(action) = self.on_delete {
            sql.push_str(&format!(" ON DELETE {}", action));
        }
        Ok(sql)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlterOp {
    AddColumn(ColumnDef),
    DropColumn(String),
    AddForeignKey(ForeignKey),
    DropConstraint(String),
}

/// One `ALTER TABLE` statement, possibly carrying several clauses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlterTable {
    pub table: String,
    pub ops: Vec<AlterOp>,
}

impl AlterTable {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ops: Vec::new(),
        }
    }

    pub fn add_column(mut self, column: ColumnDef) -> Self {
        self.ops.push(AlterOp::AddColumn(column));
        self
    }

    pub fn drop_column(mut self, column: &str) -> Self {
        self.ops.push(AlterOp::DropColumn(column.to_string()));
        self
    }

    pub fn add_foreign_key(mut self, fk: ForeignKey) -> Self {
        self.ops.push(AlterOp::AddForeignKey(fk));
        self
    }

    pub fn drop_foreign_key(mut self, name: &str) -> Self {
        self.ops.push(AlterOp::DropConstraint(name.to_string()));
        self
    }

    pub fn to_sql(&self, schema: &str) -> Result<String> {
        if self.ops.is_empty() {
            return Err(MigrateError::EmptyAlteration {
                table: self.table.clone(),
            });
        }

        let clauses = self
            .ops
            .iter()
            .map(|op| match op {
                AlterOp::AddColumn(col) => Ok(format!("ADD COLUMN {}", col.render()?)),
                AlterOp::DropColumn(name) => Ok(format!("DROP COLUMN {}", quote_ident(name)?)),
                AlterOp::AddForeignKey(fk) => Ok(format!("ADD {}", fk.render(schema)?)),
                AlterOp::DropConstraint(name) => {
                    Ok(format!("DROP CONSTRAINT {}", quote_ident(name)?))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(format!(
            "ALTER TABLE {} {}",
            qualified(schema, &self.table)?,
            clauses.join(", ")
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl Index {
    pub fn new(name: &str, table: &str) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            columns: Vec::new(),
            unique: false,
        }
    }

    pub fn column(mut self, column: &str) -> Self {
        self.columns.push(column.to_string());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn to_sql(&self, schema: &str) -> Result<String> {
        if self.columns.is_empty() {
            return Err(MigrateError::Internal(format!(
                "Index {} has no columns",
                self.name
            )));
        }

        Ok(format!(
            "CREATE {}INDEX {} ON {} ({})",
            if self.unique { "UNIQUE " } else { "" },
            quote_ident(&self.name)?,
            qualified(schema, &self.table)?,
            quote_list(&self.columns)?
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropIndex {
    pub name: String,
}

impl DropIndex {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    pub fn to_sql(&self, schema: &str) -> Result<String> {
        Ok(format!("DROP INDEX {}", qualified(schema, &self.name)?))
    }
}

/// PostgreSQL identifiers this crate accepts: lowercase, digits and underscores,
/// not starting with a digit, at most 63 bytes.
pub fn is_valid_identifier(name: &str) -> bool {
    if name.is_empty() || name.len() > 63 {
        return false;
    }

    let starts_ok = name
        .chars()
        .next()
        .map(|c| c.is_ascii_lowercase() || c == '_')
        .unwrap_or(false);

    starts_ok
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

pub fn quote_ident(name: &str) -> Result<String> {
    if !is_valid_identifier(name) {
        return Err(MigrateError::InvalidIdentifier {
            name: name.to_string(),
        });
    }
    Ok(format!("\"{}\"", name))
}

pub fn qualified(schema: &str, name: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_ident(schema)?, quote_ident(name)?))
}

fn quote_list(names: &[String]) -> Result<String> {
    let quoted = names
        .iter()
        .map(|n| quote_ident(n))
        .collect::<Result<Vec<_>>>()?;
    Ok(quoted.join(", "))
}
