//! Context error types

use hearth_storage::ObjectId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("Object not found: {0}")]
    ObjectNotFound(ObjectId),

    #[error("Entity name cannot be empty")]
    InvalidEntity,
}
