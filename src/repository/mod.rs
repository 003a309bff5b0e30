//! Repository layer for record persistence.
//!
//! All database access uses Diesel with compile-time query checking over
//! SQLite. The [`ResultStore`] trait is the seam the pipeline depends on.

mod models;
pub mod pool;
mod records;
pub mod util;

pub use pool::{AsyncSqliteConnection, AsyncSqlitePool};
pub use records::DieselRecordRepository;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Fingerprint, Record, StoredRecord};

/// Errors from the result store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("cannot open database: {0}")]
    Connection(#[from] diesel::ConnectionError),
    #[error("field encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Result of an insert-if-new.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The fingerprint was new for the source.
    Inserted {
        id: i64,
        /// Fingerprint of the source's most recent earlier record, if any.
        previous: Option<Fingerprint>,
    },
    /// A record with this (source, fingerprint) already exists.
    Duplicate,
}

impl InsertOutcome {
    pub fn is_new(&self) -> bool {
        matches!(self, Self::Inserted { .. })
    }
}

/// Durable, deduplicating record store.
///
/// Implementations must be safe to call from many tasks at once: of
/// several concurrent inserts with the same (source, fingerprint), exactly
/// one reports [`InsertOutcome::Inserted`].
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Atomically insert the record unless its (source, fingerprint) pair is
    /// already stored.
    async fn insert_if_new(&self, record: &Record) -> Result<InsertOutcome, StorageError>;

    /// Records stored within the trailing window, most recent first.
    async fn recent_records(&self, window: Duration) -> Result<Vec<StoredRecord>, StorageError>;
}
