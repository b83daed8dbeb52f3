//! Engine-independent types shared by drivers, the diff engine and the sync
//! engine.
//!
//! - [`schema`]: canonical table, column, index and foreign key metadata
//! - [`value`]: SQL values and query results
//! - [`traits`]: the [`Connector`] and [`Dialect`] seams implemented per engine
//! - [`identifier`]: identifier validation and quoting

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{ColumnInfo, EngineKind, ForeignKeyInfo, IndexInfo, TableSchema};
pub use traits::{ColumnChanges, Connector, Dialect, SelectQueryOptions};
pub use value::{ExecResult, QueryResult, Row, SqlValue};
