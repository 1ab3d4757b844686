//! Stack error types

use std::sync::Arc;

use hearth_storage::StorageError;
use thiserror::Error;

use crate::state::StackState;

/// Terminal outcome of a failed setup or save
///
/// Cloneable so every caller joined on one attempt receives the same error.
#[derive(Error, Debug, Clone)]
pub enum StackError {
    #[error("Stack setup failed: {0}")]
    Setup(#[source] Arc<StorageError>),

    #[error("Save failed: {0}")]
    Save(#[source] Arc<StorageError>),

    #[error("Stack is not ready (state: {state})")]
    NotReady { state: StackState },

    #[error("Store worker is no longer running")]
    WorkerUnavailable,

    #[error("No Tokio runtime available for store work")]
    NoRuntime,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StackError {
    pub fn is_setup(&self) -> bool {
        matches!(self, StackError::Setup(_))
    }

    pub fn is_save(&self) -> bool {
        matches!(self, StackError::Save(_))
    }

    pub fn is_not_ready(&self) -> bool {
        matches!(self, StackError::NotReady { .. })
    }

    /// The underlying store error, for setup and save failures
    pub fn storage_error(&self) -> Option<&StorageError> {
        match self {
            StackError::Setup(e) | StackError::Save(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}
