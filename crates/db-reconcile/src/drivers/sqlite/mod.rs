//! SQLite driver.
//!
//! - [`SqliteDialect`]: SQL syntax strategy
//! - [`SqliteConnector`]: file-backed pool with `pragma` introspection
//!
//! Schemas are attached database names (`main`, `temp`, or any `ATTACH`ed
//! alias).

mod connector;
mod dialect;

pub use connector::SqliteConnector;
pub use dialect::SqliteDialect;
