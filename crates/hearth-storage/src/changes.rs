//! Change sets applied by a single commit

use crate::object::{ManagedObject, ObjectId};

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Insert or replace the full object row
    Upsert(ManagedObject),
    /// Remove the object row if present
    Delete(ObjectId),
}

impl Change {
    pub fn object_id(&self) -> &ObjectId {
        match self {
            Change::Upsert(object) => &object.id,
            Change::Delete(id) => id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub fn upsert(&mut self, object: ManagedObject) {
        self.push(Change::Upsert(object));
    }

    pub fn delete(&mut self, id: ObjectId) {
        self.push(Change::Delete(id));
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter()
    }
}

/// Row counts written by one commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub upserted: usize,
    pub deleted: usize,
}
