//! Database connection and operations

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::changes::{Change, ChangeSet, CommitSummary};
use crate::migrations::run_migrations;
use crate::object::{ManagedObject, ObjectId};
use crate::store::{Store, StoreOpener};
use crate::Result;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn open_with_timeout<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;

        // Enable foreign keys
        conn.pragma_update(None, "foreign_keys", "ON")?;

        // WAL mode so readers are not blocked by the writer
        let _: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Load every object row
    pub fn load_objects(&self) -> Result<Vec<ManagedObject>> {
        self.with_connection(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, entity, attributes, updated_at FROM objects")?;

            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut objects = Vec::with_capacity(rows.len());
            for (id, entity, attributes_json, updated_str) in rows {
                let attributes: Map<String, Value> = serde_json::from_str(&attributes_json)?;

                let updated_at = match DateTime::parse_from_rfc3339(&updated_str) {
                    Ok(dt) => dt.with_timezone(&Utc),
                    Err(e) => {
                        tracing::warn!(
                            object_id = %id,
                            value = %updated_str,
                            error = %e,
                            "Malformed updated_at; using current time"
                        );
                        Utc::now()
                    }
                };

                objects.push(ManagedObject {
                    id: ObjectId::from(id),
                    entity,
                    attributes,
                    updated_at,
                });
            }

            Ok(objects)
        })
    }

    /// Apply a change set in one transaction
    pub fn commit(&self, changes: &ChangeSet) -> Result<CommitSummary> {
        if changes.is_empty() {
            return Ok(CommitSummary::default());
        }

        let summary = self.transaction(|conn| {
            let mut summary = CommitSummary::default();
            for change in changes.iter() {
                match change {
                    Change::Upsert(object) => {
                        let attributes_json = serde_json::to_string(&object.attributes)?;
                        conn.execute(
                            "INSERT OR REPLACE INTO objects (id, entity, attributes, updated_at)
                             VALUES (?1, ?2, ?3, ?4)",
                            rusqlite::params![
                                object.id.as_str(),
                                object.entity,
                                attributes_json,
                                object.updated_at.to_rfc3339(),
                            ],
                        )?;
                        summary.upserted += 1;
                    }
                    Change::Delete(id) => {
                        conn.execute("DELETE FROM objects WHERE id = ?1", [id.as_str()])?;
                        summary.deleted += 1;
                    }
                }
            }
            Ok(summary)
        })?;

        tracing::debug!(
            upserted = summary.upserted,
            deleted = summary.deleted,
            "Committed change set"
        );

        Ok(summary)
    }

    pub fn object_count(&self) -> Result<usize> {
        self.with_connection(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM objects", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        self.with_connection(|conn| {
            let value = conn
                .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(value)
        })
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        let updated_at = Utc::now().to_rfc3339();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO metadata (key, value, updated_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![key, value, updated_at],
            )?;
            Ok(())
        })?;

        Ok(())
    }

    /// Identifier generated when the store file was first created
    pub fn store_id(&self) -> Result<Option<String>> {
        self.get_metadata("store_id")
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

impl Store for Database {
    fn load_objects(&self) -> Result<Vec<ManagedObject>> {
        Database::load_objects(self)
    }

    fn commit(&self, changes: &ChangeSet) -> Result<CommitSummary> {
        Database::commit(self, changes)
    }

    fn store_id(&self) -> Result<Option<String>> {
        Database::store_id(self)
    }
}

/// Opens a SQLite store at a fixed location
#[derive(Debug, Clone)]
pub struct SqliteOpener {
    path: Option<PathBuf>,
    busy_timeout: Duration,
    create_dirs: bool,
}

impl SqliteOpener {
    pub fn file<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: Some(path.into()),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            create_dirs: true,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            create_dirs: false,
        }
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn create_dirs(mut self, create: bool) -> Self {
        self.create_dirs = create;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl StoreOpener for SqliteOpener {
    fn open(&self) -> Result<Arc<dyn Store>> {
        let db = match &self.path {
            Some(path) => {
                if self.create_dirs {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                Database::open_with_timeout(path, self.busy_timeout)?
            }
            None => Database::open_in_memory()?,
        };

        Ok(Arc::new(db))
    }
}
