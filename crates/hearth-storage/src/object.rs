//! Managed object data structure

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Stable identity of a managed object, assigned at insertion
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for ObjectId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ObjectId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedObject {
    /// Unique identifier
    pub id: ObjectId,
    /// Entity (type) name the object belongs to
    pub entity: String,
    /// Attribute values keyed by attribute name
    pub attributes: Map<String, Value>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl ManagedObject {
    pub fn new(entity: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Self {
            id: ObjectId::new(),
            entity: entity.into(),
            attributes,
            updated_at: Utc::now(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Set a single attribute, returning the previous value
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.updated_at = Utc::now();
        self.attributes.insert(key.into(), value)
    }

    /// Merge attributes into the object, overwriting existing keys
    pub fn merge(&mut self, attributes: Map<String, Value>) {
        for (key, value) in attributes {
            self.attributes.insert(key, value);
        }
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_object() {
        let mut attrs = Map::new();
        attrs.insert("title".to_string(), json!("Groceries"));

        let object = ManagedObject::new("Note", attrs);
        assert_eq!(object.entity, "Note");
        assert_eq!(object.get("title"), Some(&json!("Groceries")));
        assert!(!object.id.as_str().is_empty());
    }

    #[test]
    fn test_merge_overwrites() {
        let mut object = ManagedObject::new("Note", Map::new());
        object.set("title", json!("Draft"));
        object.set("pinned", json!(false));

        let mut patch = Map::new();
        patch.insert("title".to_string(), json!("Final"));
        object.merge(patch);

        assert_eq!(object.get("title"), Some(&json!("Final")));
        assert_eq!(object.get("pinned"), Some(&json!(false)));
    }

    #[test]
    fn test_object_ids_are_unique() {
        assert_ne!(ObjectId::new(), ObjectId::new());
        assert_eq!(ObjectId::from("abc").to_string(), "abc");
    }
}
