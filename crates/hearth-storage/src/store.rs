//! Store engine seam
//!
//! The stack manager only needs two things from an engine: load the object
//! graph once the store is open, and commit change sets. Both are blocking
//! calls and are run off the owner thread by the caller.

use std::sync::Arc;

use crate::changes::{ChangeSet, CommitSummary};
use crate::object::ManagedObject;
use crate::Result;

pub trait Store: Send + Sync + 'static {
    /// Read every persisted object
    fn load_objects(&self) -> Result<Vec<ManagedObject>>;

    /// Apply all changes atomically; on error nothing is written
    fn commit(&self, changes: &ChangeSet) -> Result<CommitSummary>;

    /// Identifier of the opened store, if the engine records one
    fn store_id(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Opens the store at its pre-configured location
pub trait StoreOpener: Send + Sync + 'static {
    fn open(&self) -> Result<Arc<dyn Store>>;
}

impl<F> StoreOpener for F
where
    F: Fn() -> Result<Arc<dyn Store>> + Send + Sync + 'static,
{
    fn open(&self) -> Result<Arc<dyn Store>> {
        self()
    }
}
