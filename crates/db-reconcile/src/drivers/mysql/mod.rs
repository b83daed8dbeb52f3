//! MySQL/MariaDB database driver.
//!
//! This module provides MySQL-specific implementations for:
//! - [`MysqlDialect`]: SQL syntax strategy
//! - [`MysqlConnector`]: pooled connection with `INFORMATION_SCHEMA` introspection
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+
//!
//! In MySQL a schema is a database, so the connector introspects the
//! configured schema name against `TABLE_SCHEMA`.

mod connector;
mod dialect;

pub use connector::MysqlConnector;
pub use dialect::MysqlDialect;
