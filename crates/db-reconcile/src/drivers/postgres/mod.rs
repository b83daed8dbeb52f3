//! PostgreSQL driver.
//!
//! This module provides PostgreSQL-specific implementations:
//!
//! - [`PostgresDialect`]: SQL syntax strategy for PostgreSQL
//! - [`PostgresConnector`]: pooled connection with catalog introspection

mod connector;
mod dialect;

pub use connector::PostgresConnector;
pub use dialect::PostgresDialect;
