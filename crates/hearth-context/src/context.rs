//! Main context
//!
//! Holds two layers: `registered` mirrors what the store contains as of the
//! last successful commit, and `pending` holds edits on top of it. Every edit
//! gets a fresh version number so a commit can tell which pending entries it
//! actually wrote.

use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;

use hearth_storage::{Change, ChangeSet, ManagedObject, ObjectId};

use crate::error::ContextError;
use crate::Result;

#[derive(Debug, Clone)]
enum Edit {
    Upsert(ManagedObject),
    Delete,
}

#[derive(Debug, Clone)]
struct Pending {
    edit: Edit,
    version: u64,
}

#[derive(Debug, Default)]
struct ContextInner {
    registered: HashMap<ObjectId, ManagedObject>,
    pending: HashMap<ObjectId, Pending>,
    next_version: u64,
}

impl ContextInner {
    fn visible(&self, id: &ObjectId) -> Option<&ManagedObject> {
        match self.pending.get(id) {
            Some(Pending {
                edit: Edit::Upsert(object),
                ..
            }) => Some(object),
            Some(Pending {
                edit: Edit::Delete, ..
            }) => None,
            None => self.registered.get(id),
        }
    }

    fn record(&mut self, id: ObjectId, edit: Edit) {
        self.next_version += 1;
        let version = self.next_version;
        self.pending.insert(id, Pending { edit, version });
    }
}

/// Pending changes captured for one write
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    changes: ChangeSet,
    versions: Vec<(ObjectId, u64)>,
}

impl Snapshot {
    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }
}

/// The single editing surface for managed objects
#[derive(Debug, Default)]
pub struct MainContext {
    inner: RwLock<ContextInner>,
}

impl MainContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context over objects already persisted in the store
    pub fn with_objects(objects: Vec<ManagedObject>) -> Self {
        let registered = objects
            .into_iter()
            .map(|object| (object.id.clone(), object))
            .collect();

        Self {
            inner: RwLock::new(ContextInner {
                registered,
                ..ContextInner::default()
            }),
        }
    }

    /// Insert a new object; it stays pending until the next successful save
    pub fn insert(&self, entity: &str, attributes: Map<String, Value>) -> Result<ManagedObject> {
        if entity.trim().is_empty() {
            return Err(ContextError::InvalidEntity);
        }

        let object = ManagedObject::new(entity, attributes);
        self.inner
            .write()
            .record(object.id.clone(), Edit::Upsert(object.clone()));

        Ok(object)
    }

    pub fn object(&self, id: &ObjectId) -> Option<ManagedObject> {
        self.inner.read().visible(id).cloned()
    }

    /// Merge attributes into an existing object
    pub fn update(&self, id: &ObjectId, attributes: Map<String, Value>) -> Result<ManagedObject> {
        self.modify(id, |object| object.merge(attributes))
    }

    pub fn set_attribute(
        &self,
        id: &ObjectId,
        key: impl Into<String>,
        value: Value,
    ) -> Result<ManagedObject> {
        self.modify(id, |object| {
            object.set(key, value);
        })
    }

    fn modify<F>(&self, id: &ObjectId, f: F) -> Result<ManagedObject>
    where
        F: FnOnce(&mut ManagedObject),
    {
        let mut inner = self.inner.write();
        let mut object = inner
            .visible(id)
            .cloned()
            .ok_or_else(|| ContextError::ObjectNotFound(id.clone()))?;

        f(&mut object);
        inner.record(id.clone(), Edit::Upsert(object.clone()));

        Ok(object)
    }

    pub fn delete(&self, id: &ObjectId) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.visible(id).is_none() {
            return Err(ContextError::ObjectNotFound(id.clone()));
        }

        // Recorded even for never-saved objects: an in-flight write may be
        // inserting them right now.
        inner.record(id.clone(), Edit::Delete);
        Ok(())
    }

    /// All visible objects of an entity, ordered by id
    pub fn objects(&self, entity: &str) -> Vec<ManagedObject> {
        let inner = self.inner.read();
        let mut objects: Vec<ManagedObject> = inner
            .registered
            .keys()
            .chain(inner.pending.keys())
            .filter_map(|id| inner.visible(id))
            .filter(|object| object.entity == entity)
            .cloned()
            .collect();

        objects.sort_by(|a, b| a.id.cmp(&b.id));
        objects.dedup_by(|a, b| a.id == b.id);
        objects
    }

    pub fn count(&self, entity: &str) -> usize {
        self.objects(entity).len()
    }

    pub fn has_changes(&self) -> bool {
        !self.inner.read().pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.read().pending.len()
    }

    /// Discard all pending edits, returning how many were dropped
    pub fn rollback(&self) -> usize {
        let dropped = {
            let mut inner = self.inner.write();
            let dropped = inner.pending.len();
            inner.pending.clear();
            dropped
        };

        if dropped > 0 {
            tracing::debug!(dropped, "Rolled back pending changes");
        }

        dropped
    }

    /// Capture every pending edit, in edit order
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.read();
        let mut entries: Vec<(&ObjectId, &Pending)> = inner.pending.iter().collect();
        entries.sort_by_key(|(_, pending)| pending.version);

        let mut snapshot = Snapshot::default();
        for (id, pending) in entries {
            let change = match &pending.edit {
                Edit::Upsert(object) => Change::Upsert(object.clone()),
                Edit::Delete => Change::Delete(id.clone()),
            };
            snapshot.changes.push(change);
            snapshot.versions.push((id.clone(), pending.version));
        }

        snapshot
    }

    /// Record that a snapshot reached the store
    ///
    /// Registered objects take the committed values. Pending entries are
    /// cleared only if they were not edited again after the snapshot.
    /// Returns the number of pending entries cleared.
    pub fn did_commit(&self, snapshot: &Snapshot) -> usize {
        let mut inner = self.inner.write();

        for change in snapshot.changes.iter() {
            match change {
                Change::Upsert(object) => {
                    inner.registered.insert(object.id.clone(), object.clone());
                }
                Change::Delete(id) => {
                    inner.registered.remove(id);
                }
            }
        }

        let mut cleared = 0;
        for (id, version) in &snapshot.versions {
            if inner.pending.get(id).map(|p| p.version) == Some(*version) {
                inner.pending.remove(id);
                cleared += 1;
            }
        }

        cleared
    }
}
