//! # ECMA-335 Metadata Tables
//!
//! Table identifiers, coded indexes, column layouts and the `#~` stream codec.
//!
//! Every table is decoded generically: a row is a vector of `u32` cells whose on-disk widths
//! follow [`TableId::columns`] and the [`TableInfo`] derived from the row counts. Patching only
//! touches a handful of cells (type and method flags) and appends rows to a few tables, so a
//! typed row struct per table is not needed.
//!
//! # Example
//!
//! ```rust
//! use dotpatch::metadata::tables::{TableId, TablesStream, TypeDefColumn};
//!
//! let mut tables = TablesStream::new();
//! tables.push(TableId::Module, vec![0, 1, 1, 0, 0])?;
//! let rid = tables.push(TableId::TypeDef, vec![0x0000_0101, 2, 0, 0, 1, 1])?;
//!
//! let bytes = tables.to_bytes()?;
//! let decoded = TablesStream::from(&bytes)?;
//! assert_eq!(decoded.cell(TableId::TypeDef, rid, TypeDefColumn::FLAGS)?, 0x0000_0101);
//! # Ok::<(), dotpatch::Error>(())
//! ```

mod codedindex;
mod schema;
mod stream;
mod tableid;
mod tableinfo;

pub use codedindex::{CodedIndex, CodedIndexType};
pub use schema::{
    AssemblyColumn, AssemblyRefColumn, ColumnKind, CustomAttributeColumn, MapColumn,
    MemberColumn, MemberRefColumn, MethodDefColumn, MethodSemanticsAttributes,
    MethodSemanticsColumn, NestedClassColumn, TypeDefColumn, TypeRefColumn,
};
pub use stream::{Row, TablesStream, HEAP_LARGE_BLOB, HEAP_LARGE_GUID, HEAP_LARGE_STRINGS};
pub use tableid::TableId;
pub use tableinfo::{TableInfo, TableRowInfo};
