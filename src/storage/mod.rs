//! Durable state for the control plane.
//!
//! Snapshots are typed JSON documents written atomically to disk; the trade
//! journal is an append-only CSV ledger read from its tail.

mod journal;
mod json;

pub use journal::{CsvTradeJournal, JournalEntry, TradeJournal};
pub use json::{JsonFileStore, Versioned};

/// StorageError represents errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}
