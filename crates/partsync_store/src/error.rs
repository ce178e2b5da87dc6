//! Error types for the local store.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in local store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O error while preparing the database location.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record named a column its collection does not have.
    #[error("unknown column {column} in collection {collection}")]
    UnknownColumn {
        /// Collection name.
        collection: &'static str,
        /// Offending column name.
        column: String,
    },

    /// A stored value could not be interpreted.
    #[error("invalid stored value in {collection}.{column}: {message}")]
    InvalidValue {
        /// Collection name.
        collection: &'static str,
        /// Column name.
        column: String,
        /// Description of the problem.
        message: String,
    },

    /// Row not found.
    #[error("row not found: {id} in collection {collection}")]
    NotFound {
        /// Collection name.
        collection: &'static str,
        /// Local or server id that was looked up.
        id: String,
    },

    /// Invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl StoreError {
    /// Creates a not found error.
    pub fn not_found(collection: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection,
            id: id.into(),
        }
    }
}
