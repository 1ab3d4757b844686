// End-to-end stack scenarios: setup failure and retry, save faults and overlapping saves.
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use hearth_core::{
    ChangeSet, CommitSummary, Config, Database, DatabaseManager, MainQueue, ManagedObject,
    StackError, StackState, StorageError, Store,
};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

type OpenResult = Result<Arc<dyn Store>, StorageError>;

/// Holds every commit until the test lets it through
struct CommitGate {
    entered: mpsc::UnboundedSender<()>,
    release: Mutex<mpsc::UnboundedReceiver<()>>,
}

/// Test side of a [`CommitGate`]
struct GateControl {
    entered: mpsc::UnboundedReceiver<()>,
    release: mpsc::UnboundedSender<()>,
}

impl GateControl {
    /// Wait until a commit is running on the store
    async fn commit_started(&mut self) {
        self.entered.recv().await.expect("store alive");
    }

    fn allow_commits(&self, count: usize) {
        for _ in 0..count {
            self.release.send(()).expect("store alive");
        }
    }
}

/// Wraps an in-memory database with switchable open and write faults
#[derive(Clone)]
struct FaultyStore {
    db: Database,
    fail: Arc<AtomicBool>,
    fail_open: Arc<AtomicBool>,
    commits: Arc<AtomicUsize>,
    gate: Option<Arc<CommitGate>>,
}

impl FaultyStore {
    fn new() -> Self {
        Self {
            db: Database::open_in_memory().expect("in-memory database"),
            fail: Arc::new(AtomicBool::new(false)),
            fail_open: Arc::new(AtomicBool::new(false)),
            commits: Arc::new(AtomicUsize::new(0)),
            gate: None,
        }
    }

    fn gated() -> (Self, GateControl) {
        let (entered_tx, entered_rx) = mpsc::unbounded_channel();
        let (release_tx, release_rx) = mpsc::unbounded_channel();
        let store = Self {
            gate: Some(Arc::new(CommitGate {
                entered: entered_tx,
                release: Mutex::new(release_rx),
            })),
            ..Self::new()
        };
        let control = GateControl {
            entered: entered_rx,
            release: release_tx,
        };
        (store, control)
    }

    fn manager(&self) -> DatabaseManager {
        let store = self.clone();
        DatabaseManager::with_opener(move || -> OpenResult {
            if store.fail_open.load(Ordering::SeqCst) {
                return Err(StorageError::Io(std::io::Error::other("simulated open fault")));
            }
            Ok(Arc::new(store.clone()))
        })
        .expect("runtime")
    }
}

impl Store for FaultyStore {
    fn load_objects(&self) -> Result<Vec<ManagedObject>, StorageError> {
        self.db.load_objects()
    }

    fn commit(&self, changes: &ChangeSet) -> Result<CommitSummary, StorageError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _ = gate.entered.send(());
            // Called from the blocking pool
            gate.release.lock().blocking_recv();
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("simulated write fault")));
        }
        self.db.commit(changes)
    }
}

fn attrs(title: &str) -> Map<String, Value> {
    let mut attrs = Map::new();
    attrs.insert("title".to_string(), json!(title));
    attrs
}

#[tokio::test]
async fn corrupt_store_fails_setup_then_recovers_after_repair() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::new(dir.path().to_path_buf());
    std::fs::write(&config.store_path, vec![0x42; 8192]).unwrap();

    let manager = DatabaseManager::new(&config).unwrap();
    let err = manager.setup_stack().await.unwrap_err();
    assert!(err.is_setup());
    assert!(matches!(err.storage_error(), Some(StorageError::Corrupt(_))));
    assert_eq!(manager.state(), StackState::Failed);
    assert!(manager.main_context().is_none());
    assert!(manager.save().await.unwrap_err().is_not_ready());

    // Repair by removing the damaged file, then retry
    std::fs::remove_file(&config.store_path).unwrap();
    manager.setup_stack().await.unwrap();
    assert_eq!(manager.state(), StackState::Ready);
    assert!(manager.main_context().is_some());
}

#[tokio::test]
async fn newer_schema_is_reported_as_setup_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::new(dir.path().to_path_buf());

    let db = Database::open(&config.store_path).unwrap();
    db.with_connection(|conn| {
        conn.execute("UPDATE schema_version SET version = 99", [])?;
        Ok(())
    })
    .unwrap();
    drop(db);

    let manager = DatabaseManager::new(&config).unwrap();
    let err = manager.setup_stack().await.unwrap_err();
    assert!(matches!(
        err.storage_error(),
        Some(StorageError::IncompatibleSchema { found: 99, .. })
    ));
}

#[tokio::test]
async fn objects_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::new(dir.path().join("nested"));

    let manager = DatabaseManager::new(&config).unwrap();
    manager.setup_stack().await.unwrap();
    let context = manager.main_context().unwrap();
    let note = context.insert("Note", attrs("keep me")).unwrap();
    manager.save().await.unwrap();
    let store_id = manager.store_id();
    drop(context);
    drop(manager);

    let manager = DatabaseManager::new(&config).unwrap();
    manager.setup_stack().await.unwrap();
    assert_eq!(manager.store_id(), store_id);
    let context = manager.main_context().unwrap();
    assert_eq!(
        context.object(&note.id).unwrap().get("title"),
        Some(&json!("keep me"))
    );
}

#[tokio::test]
async fn save_fault_keeps_changes_for_retry() {
    let store = FaultyStore::new();
    let manager = store.manager();
    manager.setup_stack().await.unwrap();
    let context = manager.main_context().unwrap();

    context.insert("Note", attrs("draft")).unwrap();
    store.fail.store(true, Ordering::SeqCst);

    let err = manager.save().await.unwrap_err();
    assert!(err.is_save());
    assert!(context.has_changes());
    assert_eq!(store.db.object_count().unwrap(), 0);

    // Retry with no further edits once the fault clears
    store.fail.store(false, Ordering::SeqCst);
    manager.save().await.unwrap();
    assert!(!context.has_changes());
    assert_eq!(store.db.object_count().unwrap(), 1);
}

#[tokio::test]
async fn empty_save_does_no_io() {
    let store = FaultyStore::new();
    let manager = store.manager();
    manager.setup_stack().await.unwrap();

    let completion = manager.save();
    assert!(completion.is_immediate());
    completion.await.unwrap();
    assert_eq!(store.commits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn save_before_ready_never_touches_store() {
    let store = FaultyStore::new();
    store.fail_open.store(true, Ordering::SeqCst);
    let manager = store.manager();

    // While the open is in flight
    let setup = manager.setup_stack();
    let err = manager.save().await.unwrap_err();
    assert!(matches!(
        err,
        StackError::NotReady {
            state: StackState::Initializing
        }
    ));

    assert!(setup.await.unwrap_err().is_setup());
    assert_eq!(manager.state(), StackState::Failed);

    let err = manager.save().await.unwrap_err();
    assert!(matches!(
        err,
        StackError::NotReady {
            state: StackState::Failed
        }
    ));
    assert_eq!(store.commits.load(Ordering::SeqCst), 0);
    assert_eq!(store.db.object_count().unwrap(), 0);
}

#[tokio::test]
async fn edits_during_write_stay_pending() {
    let (store, mut gate) = FaultyStore::gated();
    let manager = store.manager();
    manager.setup_stack().await.unwrap();
    let context = manager.main_context().unwrap();

    context.insert("Note", attrs("first")).unwrap();
    let first = manager.save();

    // The snapshot is taken before the store sees the commit
    gate.commit_started().await;
    let second = context.insert("Note", attrs("second")).unwrap();
    gate.allow_commits(1);

    first.await.unwrap();
    assert_eq!(store.db.object_count().unwrap(), 1);
    assert_eq!(context.pending_count(), 1);
    assert!(context.object(&second.id).is_some());

    gate.allow_commits(1);
    manager.save().await.unwrap();
    assert_eq!(store.db.object_count().unwrap(), 2);
    assert!(!context.has_changes());
}

#[tokio::test]
async fn overlapping_saves_are_serialized_and_coalesced() {
    let (store, mut gate) = FaultyStore::gated();
    let manager = store.manager();
    manager.setup_stack().await.unwrap();
    let context = manager.main_context().unwrap();

    let a = context.insert("Note", attrs("a")).unwrap();
    let save_a = manager.save();
    gate.commit_started().await;

    // Both queued behind the in-flight write; they share the next one
    let b = context.insert("Note", attrs("b")).unwrap();
    let save_b = manager.save();
    context.delete(&a.id).unwrap();
    let save_c = manager.save();
    gate.allow_commits(2);

    let (ra, rb, rc) = tokio::join!(save_a, save_b, save_c);
    ra.unwrap();
    rb.unwrap();
    rc.unwrap();

    assert_eq!(store.commits.load(Ordering::SeqCst), 2);
    let stored = store.db.load_objects().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, b.id);
    assert!(!context.has_changes());
}

#[tokio::test]
async fn handler_reports_setup_failure_on_main_queue() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::new(dir.path().to_path_buf());
    std::fs::write(&config.store_path, vec![0x42; 8192]).unwrap();

    let manager = DatabaseManager::new(&config).unwrap();
    let mut queue = MainQueue::new();
    let outcome = Arc::new(Mutex::new(None));

    let slot = Arc::clone(&outcome);
    manager.setup_stack_with_handler(&queue.handle(), move |ok, err| {
        *slot.lock() = Some((ok, err));
    });
    queue.run_next().await;

    let (ok, err) = outcome.lock().take().expect("handler ran");
    assert!(!ok);
    assert!(matches!(err, Some(StackError::Setup(_))));
}
