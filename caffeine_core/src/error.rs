//! Error types for the caffeine_core library.

use std::io;
use std::path::PathBuf;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for caffeine_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The ledger file exists but cannot be decoded.
    ///
    /// Never recovered from: the file is left in place and the tracker halts.
    #[error("Ledger file {path:?} is corrupted: {source}")]
    CorruptStore {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A mutation was attempted before the tracker finished loading
    #[error("Tracker is not ready yet")]
    NotReady,

    /// The store actor has shut down
    #[error("Ledger store is closed")]
    StoreClosed,

    /// External health-record store failure
    #[error("Health store error: {0}")]
    Health(String),

    /// Drink name not present in the catalog
    #[error("Unknown drink: {0}")]
    UnknownDrink(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
