//! Stack configuration

use hearth_storage::SqliteOpener;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::StackError;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the store file
    pub store_path: PathBuf,
    /// Keep the store in memory; `store_path` is ignored
    pub in_memory: bool,
    /// How long a write waits on a locked database file
    pub busy_timeout_ms: u64,
    /// Create the parent directory of `store_path` when opening
    pub create_dirs: bool,
}

impl Config {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            store_path: data_dir.join("hearth.db"),
            in_memory: false,
            busy_timeout_ms: 5_000,
            create_dirs: true,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            in_memory: true,
            ..Self::default()
        }
    }

    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join("Hearth"))
            .unwrap_or_else(|| PathBuf::from(".hearth"))
    }

    /// Load a JSON config file; missing keys take their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StackError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| StackError::Config(e.to_string()))
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// The SQLite opener for the configured location
    pub fn opener(&self) -> SqliteOpener {
        let opener = if self.in_memory {
            SqliteOpener::in_memory()
        } else {
            SqliteOpener::file(&self.store_path).create_dirs(self.create_dirs)
        };

        opener.busy_timeout(self.busy_timeout())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Self::data_dir())
    }
}

mod dirs {
    use std::path::PathBuf;

    pub fn data_local_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("LOCALAPPDATA").ok().map(PathBuf::from)
        }
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
        }
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".local/share"))
                })
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_config() {
        let config = Config::new(PathBuf::from("/tmp/app"));
        assert_eq!(config.store_path, PathBuf::from("/tmp/app/hearth.db"));
        assert!(!config.in_memory);
        assert_eq!(config.busy_timeout(), Duration::from_secs(5));

        let opener = config.opener();
        assert_eq!(opener.path(), Some(Path::new("/tmp/app/hearth.db")));
    }

    #[test]
    fn test_in_memory_opener_has_no_path() {
        assert!(Config::in_memory().opener().path().is_none());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = Config::from_json(r#"{ "store_path": "/data/x.db", "busy_timeout_ms": 250 }"#)
            .unwrap();
        assert_eq!(config.store_path, PathBuf::from("/data/x.db"));
        assert_eq!(config.busy_timeout_ms, 250);
        assert!(config.create_dirs);
    }

    #[test]
    fn test_load_reports_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hearth.json");

        assert!(matches!(Config::load(&path), Err(StackError::Config(_))));

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Config::load(&path), Err(StackError::Config(_))));

        std::fs::write(&path, r#"{ "in_memory": true }"#).unwrap();
        assert!(Config::load(&path).unwrap().in_memory);
    }
}
