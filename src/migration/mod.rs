//! Reversible migrations and the registry the runner works from.

mod m20240611_000001_add_timeslot_id_to_performer_signups;
mod runner;

pub use m20240611_000001_add_timeslot_id_to_performer_signups::AddTimeslotIdToPerformerSignups;
pub use runner::{AppliedMigration, MigrationRunner, MigrationStatus, PlannedMigration};

/// Names and objects touched by the timeslot migration.
pub mod timeslot {
    pub use super::m20240611_000001_add_timeslot_id_to_performer_signups::{
        COLUMN, FOREIGN_KEY, INDEX, NAME, REFERENCED_TABLE, TABLE,
    };
}

use crate::error::Result;
use crate::schema::SchemaManager;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A versioned, reversible schema change.
///
/// `up` and `down` receive the schema handle and either complete or return the
/// driver's error; the runner owns the surrounding transaction.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Unique name; migrations are applied in ascending name order.
    fn name(&self) -> &str;

    async fn up(&self, manager: &SchemaManager<'_>) -> Result<()>;

    async fn down(&self, manager: &SchemaManager<'_>) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// Every migration this crate knows about.
pub fn registry() -> Vec<Box<dyn Migration>> {
    vec![Box::new(AddTimeslotIdToPerformerSignups)]
}

/// Render one direction of a migration without touching a database.
pub async fn render(
    migration: &dyn Migration,
    schema: &str,
    direction: Direction,
) -> Result<Vec<String>> {
    let manager = SchemaManager::dry_run(schema, migration.name());
    match direction {
        Direction::Up => migration.up(&manager).await?,
        Direction::Down => migration.down(&manager).await?,
    }
    Ok(manager.recorded())
}

/// SHA-256 of the rendered forward DDL; detects edits to already applied migrations.
pub async fn checksum(migration: &dyn Migration, schema: &str) -> Result<String> {
    let statements = render(migration, schema, Direction::Up).await?;
    Ok(compute_checksum(&statements.join(";\n")))
}

fn compute_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_checksum() {
        let content = "ALTER TABLE \"public\".\"acts\" ADD COLUMN \"venue_id\" UUID NULL";
        let checksum = compute_checksum(content);
        assert_eq!(checksum.len(), 64); // SHA256 produces 64 hex characters

        // Same content should produce same checksum
        assert_eq!(checksum, compute_checksum(content));

        // Different content should produce different checksum
        assert_ne!(checksum, compute_checksum("DROP INDEX \"public\".\"x\""));
    }

    #[tokio::test]
    async fn test_checksum_depends_on_schema() {
        let migration = AddTimeslotIdToPerformerSignups;
        let public = checksum(&migration, "public").await.unwrap();
        let other = checksum(&migration, "festival").await.unwrap();
        assert_ne!(public, other);
        assert_eq!(public, checksum(&migration, "public").await.unwrap());
    }

    #[test]
    fn test_registry_names_are_sorted_and_unique() {
        let names: Vec<String> = registry().iter().map(|m| m.name().to_string()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(names, sorted);
        assert!(names.contains(&timeslot::NAME.to_string()));
    }

    #[tokio::test]
    async fn test_render_both_directions() {
        let migration = AddTimeslotIdToPerformerSignups;
        let up = render(&migration, "public", Direction::Up).await.unwrap();
        let down = render(&migration, "public", Direction::Down).await.unwrap();
        assert_eq!(up.len(), 2);
        assert_eq!(down.len(), 3);
        assert_eq!(Direction::Down.to_string(), "down");
    }
}
