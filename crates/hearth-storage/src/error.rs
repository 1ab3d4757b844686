//! Storage error types

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Store file is corrupt or not a database: {0}")]
    Corrupt(#[source] rusqlite::Error),

    #[error("Incompatible schema version {found} (supported up to {supported})")]
    IncompatibleSchema { found: i32, supported: i32 },

    #[error("Store is not accessible: {0}")]
    Inaccessible(#[source] rusqlite::Error),

    #[error("Insufficient storage: {0}")]
    DiskFull(#[source] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    Constraint(#[source] rusqlite::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[source] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store worker failed: {0}")]
    Worker(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase) => {
                StorageError::Corrupt(err)
            }
            Some(
                ErrorCode::CannotOpen
                | ErrorCode::PermissionDenied
                | ErrorCode::ReadOnly
                | ErrorCode::NoLargeFileSupport,
            ) => StorageError::Inaccessible(err),
            Some(ErrorCode::DiskFull) => StorageError::DiskFull(err),
            Some(ErrorCode::ConstraintViolation) => StorageError::Constraint(err),
            _ => StorageError::Sqlite(err),
        }
    }
}
