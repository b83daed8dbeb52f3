//! Row-level data diff and sync.
//!
//! A run reads both sides page by page into maps of primary-key tuple →
//! SHA-256 content digest, classifies every key into insert, update or
//! delete buckets and applies each bucket in bounded batches, one target
//! transaction per batch.
//!
//! ```text
//! source ──scan_page──┐
//!                     ├─► classify ─► batches ─► apply_batch ─► target
//! target ──scan_page──┘
//! ```
//!
//! Cancellation is checked between batches only; a batch in flight always
//! finishes or fails as a unit.

mod classify;
mod engine;
mod key;
mod memory;
mod options;
mod run;
mod source;

pub use classify::{classify, read_digests, Classification, DigestMap, RowShape};
pub use engine::{sync, table_data_diff, TableDataDiff};
pub use key::{content_digest, RowDigest, RowKey};
pub use memory::{MemorySource, MemoryTarget};
pub use options::{RetryPolicy, SyncMode, SyncOptions};
pub use run::{RunStatus, SyncRun, TableRef};
pub use source::{MutationBatch, MutationKind, RowSource, RowTarget, TableSource, TableTarget};
