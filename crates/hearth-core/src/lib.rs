//! Hearth Core
//!
//! Lifecycle layer for a local object store:
//! - `setup_stack` opens the store off the owner thread and publishes the main context once
//! - `save` persists pending changes through a single writer, never blocking the caller
//! - Every request resolves exactly once, through its `Completion` or handler

mod completion;
mod config;
mod dispatch;
mod error;
mod manager;
mod state;
mod writer;

pub use completion::Completion;
pub use config::Config;
pub use dispatch::{MainQueue, MainQueueHandle};
pub use error::StackError;
pub use manager::DatabaseManager;
pub use state::StackState;

// Re-export stack components
pub use hearth_context::{ContextError, MainContext, Snapshot};
pub use hearth_storage::{
    Change, ChangeSet, CommitSummary, Database, ManagedObject, ObjectId, SqliteOpener,
    StorageError, Store, StoreOpener,
};

pub type Result<T> = std::result::Result<T, StackError>;

/// Initialize logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();
}
