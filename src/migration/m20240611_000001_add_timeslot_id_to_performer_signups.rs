//! Links performer signups to the timeslot they were booked into.
//!
//! `timeslot_id` is optional; deleting a timeslot deletes the signups booked into it.

use crate::error::Result;
use crate::migration::Migration;
use crate::schema::{
    AlterTable, ColumnDef, ColumnType, DropIndex, ForeignKey, Index, ReferentialAction,
    SchemaManager,
};
use async_trait::async_trait;

pub const NAME: &str = "m20240611_000001_add_timeslot_id_to_performer_signups";

pub const TABLE: &str = "performer_signups";
pub const COLUMN: &str = "timeslot_id";
pub const REFERENCED_TABLE: &str = "timeslots";
pub const FOREIGN_KEY: &str = "performer_signups_timeslot_id_foreign";
pub const INDEX: &str = "performer_signups_timeslot_id_index";

pub struct AddTimeslotIdToPerformerSignups;

#[async_trait]
impl Migration for AddTimeslotIdToPerformerSignups {
    fn name(&self) -> &str {
        NAME
    }

    async fn up(&self, manager: &SchemaManager<'_>) -> Result<()> {
        manager
            .alter_table(
                AlterTable::new(TABLE)
                    .add_column(ColumnDef::new(COLUMN, ColumnType::Uuid).null())
                    .add_foreign_key(
                        ForeignKey::new(FOREIGN_KEY)
                            .from_column(COLUMN)
                            .to(REFERENCED_TABLE, "id")
                            .on_delete(ReferentialAction::Cascade),
                    ),
            )
            .await?;

        manager
            .create_index(Index::new(INDEX, TABLE).column(COLUMN))
            .await
    }

    async fn down(&self, manager: &SchemaManager<'_>) -> Result<()> {
        // The constraint and index reference the column, so they go first.
        manager
            .alter_table(AlterTable::new(TABLE).drop_foreign_key(FOREIGN_KEY))
            .await?;
        manager.drop_index(DropIndex::new(INDEX)).await?;
        manager
            .alter_table(AlterTable::new(TABLE).drop_column(COLUMN))
            .await
    }
}
