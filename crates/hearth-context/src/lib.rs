//! Hearth Main Context
//!
//! The in-memory object graph the owner thread reads and edits.
//! - Edits are tracked as pending changes until a commit succeeds
//! - A snapshot captures the pending changes for one write
//! - Edits made after a snapshot stay pending for the next write

mod context;
mod error;

pub use context::{MainContext, Snapshot};
pub use error::ContextError;

pub type Result<T> = std::result::Result<T, ContextError>;
