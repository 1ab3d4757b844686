//! Database Manager
//!
//! Owns the stack lifecycle: opens the store off the owner thread, publishes
//! the main context once, and routes save requests to the stack's writer.

use parking_lot::Mutex;
use std::sync::Arc;

use hearth_context::MainContext;
use hearth_storage::{ManagedObject, StorageError, Store, StoreOpener};
use tokio::runtime::Handle;

use crate::completion::{Completer, Completion};
use crate::config::Config;
use crate::dispatch::MainQueueHandle;
use crate::error::StackError;
use crate::state::StackState;
use crate::writer::SaveWriter;
use crate::Result;

/// Everything published on the transition to `Ready`
struct Stack {
    context: Arc<MainContext>,
    writer: SaveWriter,
    store_id: Option<String>,
}

#[derive(Default)]
struct ManagerInner {
    state: StackState,
    /// Callers waiting on the in-flight setup attempt
    waiters: Vec<Completer>,
    stack: Option<Arc<Stack>>,
}

impl ManagerInner {
    fn transition(&mut self, next: StackState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid stack transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(from = %self.state, to = %next, "Stack state changed");
        self.state = next;
    }
}

struct OpenedStore {
    store: Arc<dyn Store>,
    objects: Vec<ManagedObject>,
    store_id: Option<String>,
}

pub struct DatabaseManager {
    opener: Arc<dyn StoreOpener>,
    runtime: Handle,
    inner: Arc<Mutex<ManagerInner>>,
}

impl DatabaseManager {
    /// Manager for the configured SQLite store, driven by the current Tokio runtime
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_opener(config.opener())
    }

    pub fn with_opener<O: StoreOpener>(opener: O) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| StackError::NoRuntime)?;
        Ok(Self::with_runtime(opener, runtime))
    }

    pub fn with_runtime<O: StoreOpener>(opener: O, runtime: Handle) -> Self {
        Self {
            opener: Arc::new(opener),
            runtime,
            inner: Arc::new(Mutex::new(ManagerInner::default())),
        }
    }

    pub fn state(&self) -> StackState {
        self.inner.lock().state
    }

    /// The main context; `None` until setup has succeeded
    pub fn main_context(&self) -> Option<Arc<MainContext>> {
        self.inner
            .lock()
            .stack
            .as_ref()
            .map(|stack| Arc::clone(&stack.context))
    }

    /// Identifier recorded in the opened store, if any
    pub fn store_id(&self) -> Option<String> {
        self.inner
            .lock()
            .stack
            .as_ref()
            .and_then(|stack| stack.store_id.clone())
    }

    /// Bring the store online
    ///
    /// Returns at once. While a setup is in flight further calls join it and
    /// resolve with the same outcome; once ready this is an immediate success;
    /// after a failure it starts a fresh attempt.
    pub fn setup_stack(&self) -> Completion {
        let mut inner = self.inner.lock();
        match inner.state {
            StackState::Ready => return Completion::ready(Ok(())),
            StackState::Initializing => {
                let (completer, completion) = Completion::channel();
                inner.waiters.push(completer);
                tracing::debug!(
                    waiters = inner.waiters.len(),
                    "Joined in-flight stack setup"
                );
                return completion;
            }
            StackState::Uninitialized | StackState::Failed => {}
        }

        inner.transition(StackState::Initializing);
        let (completer, completion) = Completion::channel();
        inner.waiters.push(completer);
        drop(inner);

        tracing::info!("Setting up store stack");

        let opener = Arc::clone(&self.opener);
        let task = SetupTask {
            shared: Arc::clone(&self.inner),
            runtime: self.runtime.clone(),
            finished: false,
        };
        // If the runtime is gone the future is dropped unpolled and the
        // task's drop reports the failure instead.
        self.runtime.spawn(async move {
            let opened = tokio::task::spawn_blocking(move || open_store(opener.as_ref()))
                .await
                .unwrap_or_else(|e| Err(StorageError::Worker(e.to_string())));

            task.finish(opened);
        });

        completion
    }

    /// Persist every pending change in the main context
    ///
    /// Returns at once. Before the stack is ready this resolves with
    /// `NotReady` and touches nothing; with nothing pending it resolves with
    /// success and does no I/O. Requests issued while a write is queued are
    /// coalesced into that write.
    pub fn save(&self) -> Completion {
        let stack = {
            let inner = self.inner.lock();
            match (&inner.stack, inner.state) {
                (Some(stack), StackState::Ready) => Arc::clone(stack),
                (_, state) => {
                    tracing::warn!(%state, "Save requested before stack is ready");
                    return Completion::ready(Err(StackError::NotReady { state }));
                }
            }
        };

        stack.writer.submit(&stack.context)
    }

    /// [`setup_stack`](Self::setup_stack) reporting through `handler` on the owner's queue
    pub fn setup_stack_with_handler<F>(&self, queue: &MainQueueHandle, handler: F)
    where
        F: FnOnce(bool, Option<StackError>) + Send + 'static,
    {
        let completion = self.setup_stack();
        self.deliver(queue.clone(), completion, handler);
    }

    /// [`save`](Self::save) reporting through `handler` on the owner's queue
    pub fn save_with_handler<F>(&self, queue: &MainQueueHandle, handler: F)
    where
        F: FnOnce(bool, Option<StackError>) + Send + 'static,
    {
        let completion = self.save();
        self.deliver(queue.clone(), completion, handler);
    }

    fn deliver<F>(&self, queue: MainQueueHandle, completion: Completion, handler: F)
    where
        F: FnOnce(bool, Option<StackError>) + Send + 'static,
    {
        self.runtime.spawn(async move {
            let result = completion.await;
            let posted = queue.post(move || match result {
                Ok(()) => handler(true, None),
                Err(e) => handler(false, Some(e)),
            });

            if !posted {
                tracing::warn!("Main queue closed; completion handler dropped");
            }
        });
    }
}

impl Clone for DatabaseManager {
    fn clone(&self) -> Self {
        Self {
            opener: Arc::clone(&self.opener),
            runtime: self.runtime.clone(),
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Resolves the setup attempt exactly once, even if its future never completes
struct SetupTask {
    shared: Arc<Mutex<ManagerInner>>,
    runtime: Handle,
    finished: bool,
}

impl SetupTask {
    fn finish(mut self, opened: hearth_storage::Result<OpenedStore>) {
        self.finished = true;
        finish_setup(&self.shared, &self.runtime, opened);
    }
}

impl Drop for SetupTask {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("Stack setup task dropped before the store opened");
            finish_setup(
                &self.shared,
                &self.runtime,
                Err(StorageError::Worker("setup task cancelled".to_string())),
            );
        }
    }
}

fn open_store(opener: &dyn StoreOpener) -> hearth_storage::Result<OpenedStore> {
    let store = opener.open()?;
    let objects = store.load_objects()?;
    let store_id = store.store_id()?;

    Ok(OpenedStore {
        store,
        objects,
        store_id,
    })
}

fn finish_setup(
    shared: &Mutex<ManagerInner>,
    runtime: &Handle,
    opened: hearth_storage::Result<OpenedStore>,
) {
    let mut inner = shared.lock();

    let outcome = match opened {
        Ok(opened) => {
            let object_count = opened.objects.len();
            let context = Arc::new(MainContext::with_objects(opened.objects));
            let writer = SaveWriter::spawn(runtime, opened.store, Arc::clone(&context));

            tracing::info!(
                store_id = opened.store_id.as_deref().unwrap_or("-"),
                objects = object_count,
                "Store stack ready"
            );

            // Context and state are published under the same lock
            inner.stack = Some(Arc::new(Stack {
                context,
                writer,
                store_id: opened.store_id,
            }));
            inner.transition(StackState::Ready);
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Store stack setup failed");
            inner.transition(StackState::Failed);
            Err(StackError::Setup(Arc::new(e)))
        }
    };

    let waiters = std::mem::take(&mut inner.waiters);
    drop(inner);

    for waiter in waiters {
        let _ = waiter.send(outcome.clone());
    }
}
