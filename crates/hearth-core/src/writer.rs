//! Save coordination
//!
//! One writer task per stack owns every write to the store. Save requests are
//! queued to it; each time it wakes it takes all queued requests, commits the
//! context's pending changes once, and answers every request in the batch with
//! that single outcome.

use std::sync::Arc;

use hearth_context::{MainContext, Snapshot};
use hearth_storage::{StorageError, Store};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::completion::{Completer, Completion};
use crate::error::StackError;
use crate::Result;

pub(crate) struct SaveWriter {
    jobs: mpsc::UnboundedSender<Completer>,
}

impl SaveWriter {
    pub(crate) fn spawn(runtime: &Handle, store: Arc<dyn Store>, context: Arc<MainContext>) -> Self {
        let (jobs, queue) = mpsc::unbounded_channel();
        runtime.spawn(run_writer(store, context, queue));
        Self { jobs }
    }

    /// Queue a save of everything pending in `context`
    pub(crate) fn submit(&self, context: &MainContext) -> Completion {
        if !context.has_changes() {
            tracing::trace!("Save skipped: no pending changes");
            return Completion::ready(Ok(()));
        }

        let (completer, completion) = Completion::channel();
        if self.jobs.send(completer).is_err() {
            return Completion::ready(Err(StackError::WorkerUnavailable));
        }

        completion
    }
}

async fn run_writer(
    store: Arc<dyn Store>,
    context: Arc<MainContext>,
    mut queue: mpsc::UnboundedReceiver<Completer>,
) {
    while let Some(first) = queue.recv().await {
        let mut batch = vec![first];
        while let Ok(next) = queue.try_recv() {
            batch.push(next);
        }

        let result = write_pending(&store, &context).await;
        if batch.len() > 1 {
            tracing::debug!(batched = batch.len(), "Coalesced save requests");
        }

        for completer in batch {
            // The caller may have stopped waiting
            let _ = completer.send(result.clone());
        }
    }

    tracing::debug!("Save writer stopped");
}

async fn write_pending(store: &Arc<dyn Store>, context: &Arc<MainContext>) -> Result<()> {
    let snapshot = context.snapshot();
    if snapshot.is_empty() {
        // An earlier write already covered these requests
        return Ok(());
    }

    let store = Arc::clone(store);
    let joined = tokio::task::spawn_blocking(move || {
        let outcome = store.commit(snapshot.changes());
        (snapshot, outcome)
    })
    .await;

    let (snapshot, outcome): (Snapshot, hearth_storage::Result<_>) = match joined {
        Ok(pair) => pair,
        Err(e) => {
            tracing::error!(error = %e, "Store write task failed");
            return Err(StackError::Save(Arc::new(StorageError::Worker(e.to_string()))));
        }
    };

    match outcome {
        Ok(summary) => {
            let cleared = context.did_commit(&snapshot);
            tracing::info!(
                upserted = summary.upserted,
                deleted = summary.deleted,
                still_pending = context.pending_count(),
                cleared,
                "Saved pending changes"
            );
            Ok(())
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                changes = snapshot.len(),
                "Save failed; changes kept pending"
            );
            Err(StackError::Save(Arc::new(e)))
        }
    }
}
