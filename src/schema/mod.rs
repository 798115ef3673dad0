mod builder;
mod inspector;
mod manager;

pub use builder::{
    is_valid_identifier, qualified, quote_ident, AlterOp, AlterTable, ColumnDef, ColumnType,
    DropIndex, ForeignKey, Index, ReferentialAction,
};
pub use inspector::{ColumnInfo, ConstraintInfo, IndexInfo, SchemaInspector, TableSnapshot};
pub use manager::SchemaManager;
