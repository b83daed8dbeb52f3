//! Utilities shared by the driver implementations.
//!
//! - [`tls`]: `ssl_mode` parsing and the Postgres rustls connector
//! - [`row`]: field accessors for decoded catalog rows

pub mod row;
pub mod tls;

pub use tls::{SslMode, TlsBuilder};
