//! Error types for the database layer.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while opening, using or initializing a database.
#[derive(Debug, Error)]
pub enum DbError {
    /// The driver could not open or configure the backing store.
    #[error("failed to open database at {}: {source}", path.display())]
    Open {
        /// Location that was being opened.
        path: PathBuf,
        /// The underlying SQLite error.
        source: rusqlite::Error,
    },

    /// A statement or query failed.
    #[error("database query failed: {0}")]
    Query(#[from] rusqlite::Error),

    /// A value could not be decoded according to its declared column type.
    #[error("column '{column}' declared as {declared} holds an undecodable value: {value}")]
    Conversion {
        /// Column name.
        column: String,
        /// Declared type of the column.
        declared: String,
        /// The raw value, lossily rendered.
        value: String,
    },

    /// The schema script file could not be read.
    #[error("failed to read schema script {}: {source}", path.display())]
    SchemaRead {
        /// Location of the script.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The schema script file is not valid UTF-8.
    #[error("schema script {} is not valid UTF-8: {source}", path.display())]
    SchemaEncoding {
        /// Location of the script.
        path: PathBuf,
        /// The decoding error.
        source: std::string::FromUtf8Error,
    },

    /// The schema script failed to execute.
    #[error("schema script failed: {0}")]
    SchemaExecution(rusqlite::Error),

    /// The handle was used after teardown closed it.
    #[error("connection handle {0} has already been closed")]
    Closed(u64),
}
