//! Failures reading or writing workload, sample and decision records.

use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

/// Every variant except `NotFound` and `Conflict` wraps a redb or
/// serde_json error message; callers only branch on those two.
#[derive(Debug, Error)]
pub enum StateError {
    /// The redb file could not be created or opened.
    #[error("failed to open state database: {0}")]
    Open(String),

    #[error("state transaction failed: {0}")]
    Transaction(String),

    /// One of the workloads, samples or decisions tables.
    #[error("failed to open table: {0}")]
    Table(String),

    #[error("failed to read record: {0}")]
    Read(String),

    #[error("failed to write record: {0}")]
    Write(String),

    #[error("failed to encode record: {0}")]
    Serialize(String),

    /// A stored record no longer matches its type, e.g. after a downgrade.
    #[error("failed to decode record: {0}")]
    Deserialize(String),

    /// No workload with this key is registered.
    #[error("workload not found: {0}")]
    NotFound(String),

    /// A replica change raced another writer; re-read and retry.
    #[error("workload {key} changed underneath: expected generation {expected}, found {actual}")]
    Conflict {
        key: String,
        expected: u64,
        actual: u64,
    },
}
