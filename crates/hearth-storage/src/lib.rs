//! Hearth Storage Layer
//!
//! SQLite-backed store engine for managed objects.
//! Every commit applies one change set in a single transaction.

mod changes;
mod database;
mod error;
mod migrations;
mod object;
mod store;

pub use changes::{Change, ChangeSet, CommitSummary};
pub use database::{Database, SqliteOpener};
pub use error::StorageError;
pub use migrations::SCHEMA_VERSION;
pub use object::{ManagedObject, ObjectId};
pub use store::{Store, StoreOpener};

pub type Result<T> = std::result::Result<T, StorageError>;
