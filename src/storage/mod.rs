//! Storage layer for scholarly
//!
//! Owns the data directory layout and the shared SQLite database

pub mod database;

use crate::config::Config;
use crate::error::{Result, ScholarError};
use std::path::{Path, PathBuf};

pub use database::{Database, DbConn, DbPool, DbStats};

/// Coordinates the on-disk layout:
///
/// ```text
/// <data_dir>/
///   store/db.sqlite
///   store/index/documents.idx
///   store/index/documents.map
/// ```
pub struct StorageManager {
    pub database: Database,
    base_path: PathBuf,
    index_path: PathBuf,
    mapping_path: PathBuf,
}

impl StorageManager {
    /// Open storage with the default layout under `base_path`
    pub fn new(base_path: PathBuf) -> Result<Self> {
        let store = base_path.join("store");
        Self::open(
            base_path.clone(),
            store.join("db.sqlite"),
            store.join("index").join("documents.idx"),
            store.join("index").join("documents.map"),
        )
    }

    /// Open storage at the locations named in the configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::open(
            crate::config::expand_home(&config.storage.data_dir),
            config.database_path(),
            config.index_path(),
            config.mapping_path(),
        )
    }

    fn open(
        base_path: PathBuf,
        database_path: PathBuf,
        index_path: PathBuf,
        mapping_path: PathBuf,
    ) -> Result<Self> {
        for path in [&index_path, &mapping_path] {
            if let Some(parent) = path.parent() {
                create_dir(parent)?;
            }
        }

        let database = Database::new(&database_path)?;

        Ok(Self {
            database,
            base_path,
            index_path,
            mapping_path,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn mapping_path(&self) -> &Path {
        &self.mapping_path
    }

    /// Whether both halves of a persisted index are present
    pub fn has_index(&self) -> bool {
        self.index_path.exists() && self.mapping_path.exists()
    }

    /// Get combined storage statistics
    pub fn stats(&self) -> Result<StorageStats> {
        let db = self.database.stats()?;
        let index_size = [&self.index_path, &self.mapping_path]
            .iter()
            .filter_map(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .sum();

        Ok(StorageStats {
            db,
            index_size,
            total_size: Self::dir_size(&self.base_path)?,
        })
    }

    fn dir_size(path: &Path) -> Result<u64> {
        let mut size = 0u64;

        if path.is_dir() {
            let entries = std::fs::read_dir(path).map_err(|e| ScholarError::Io {
                source: e,
                context: format!("Failed to read directory: {}", path.display()),
            })?;
            for entry in entries {
                let entry = entry.map_err(|e| ScholarError::Io {
                    source: e,
                    context: "Failed to read directory entry".to_string(),
                })?;
                let path = entry.path();

                if path.is_dir() {
                    size += Self::dir_size(&path)?;
                } else if let Ok(metadata) = entry.metadata() {
                    size += metadata.len();
                }
            }
        }

        Ok(size)
    }
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| ScholarError::Io {
        source: e,
        context: format!("Failed to create directory: {}", path.display()),
    })
}

/// Combined storage statistics
#[derive(Debug, serde::Serialize)]
pub struct StorageStats {
    pub db: DbStats,
    pub index_size: u64,
    pub total_size: u64,
}

impl StorageStats {
    /// Format size as human-readable string
    pub fn format_size(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_layout() {
        let temp_dir = TempDir::new().unwrap();
        let storage = StorageManager::new(temp_dir.path().to_path_buf()).unwrap();

        assert!(temp_dir.path().join("store/db.sqlite").exists());
        assert!(temp_dir.path().join("store/index").is_dir());
        assert!(!storage.has_index());
    }

    #[test]
    fn test_from_config_uses_configured_paths() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = temp_dir.path().to_path_buf();
        config.storage.database_file = PathBuf::from("custom/history.sqlite");

        let storage = StorageManager::from_config(&config).unwrap();
        assert!(temp_dir.path().join("custom/history.sqlite").exists());
        assert_eq!(storage.index_path(), config.index_path().as_path());
    }

    #[test]
    fn test_stats() {
        let temp_dir = TempDir::new().unwrap();
        let storage = StorageManager::new(temp_dir.path().to_path_buf()).unwrap();
        let stats = storage.stats().unwrap();
        assert_eq!(stats.index_size, 0);
        assert!(stats.total_size > 0);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(StorageStats::format_size(0), "0.00 B");
        assert_eq!(StorageStats::format_size(1024), "1.00 KB");
        assert_eq!(StorageStats::format_size(1024 * 1024), "1.00 MB");
    }
}
