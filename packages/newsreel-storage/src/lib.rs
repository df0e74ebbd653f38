//! Durable record storage for the newsreel production pipeline.
//!
//! ## Core Principles
//!
//! 1. **Scoped records**: every record belongs to a channel scope; the
//!    (scope, key) pair is the conflict key everywhere.
//! 2. **JSON values**: callers persist serde-serializable values; the
//!    store never interprets them.
//! 3. **Advisory expiry**: `expires_at` is stored and returned, never
//!    enforced — expiry policy (lazy cache expiry) lives with the caller.
//!
//! ## Adapters
//!
//! - `MemoryRecordStore`: dashmap-backed, for tests and development
//! - `SqliteRecordStore`: rusqlite adapter (feature `sqlite`, default)

pub mod domain;
pub mod error;
pub mod infrastructure;

pub use error::{ErrorKind, Result, StorageError};

pub use domain::{RecordFilter, RecordStore, StoredRecord};
pub use infrastructure::MemoryRecordStore;

#[cfg(feature = "sqlite")]
pub use infrastructure::SqliteRecordStore;
