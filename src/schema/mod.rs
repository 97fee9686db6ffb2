//! System catalog: table, index, and foreign-key descriptors, stored in system B+trees rooted
//! from the page-file header.

pub mod catalog;
pub mod column;
pub mod fk;
pub mod index;

pub use catalog::{SystemCatalog, TableDef};
pub use column::{ColumnDef, DefaultValue};
pub use fk::{FkAction, ForeignKeyDef};
pub use index::{IndexDef, IndexType};
