//! Persistent JSON storage
//!
//! Entries live as one JSON file per identifier below the platform's cache
//! directory. Writes go through a temporary file so a crashed run never
//! leaves a truncated entry behind.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// The platform has no cache directory for this user
    #[error("Failed to determine cache directory location")]
    CacheDirectoryNotFound,

    /// A file system operation on the cache failed
    #[error("Failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        source: io::Error,
    },

    /// A stored entry is not valid JSON for the expected type
    #[error("Cache entry {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Failed to serialize data for caching
    #[error("Failed to serialize data: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

impl CacheError {
    fn io(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> Self {
        let path = path.to_path_buf();
        move |source| CacheError::Io {
            action,
            path,
            source,
        }
    }
}

/// Returns the application's cache root
///
/// - Linux: ~/.cache/anirip/
/// - macOS: ~/Library/Caches/com.swolfe.anirip/
/// - Windows: %LOCALAPPDATA%\swolfe\anirip\cache\
pub fn default_cache_root() -> Result<PathBuf, CacheError> {
    directories::ProjectDirs::from("com", "swolfe", "anirip")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .ok_or(CacheError::CacheDirectoryNotFound)
}

/// A directory of JSON entries of one type
pub struct CacheStorage<T> {
    dir: PathBuf,
    _entry: PhantomData<T>,
}

impl<T> CacheStorage<T>
where
    T: Serialize + for<'de> Deserialize<'de>,
{
    /// Opens the storage named `name` below the application's cache root
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let sessions: CacheStorage<Session> = CacheStorage::open("sessions")?;
    /// ```
    pub fn open(name: &str) -> Result<Self, CacheError> {
        Self::open_in(&default_cache_root()?.join(sanitize_name(name)))
    }

    /// Opens a storage rooted at an explicit directory, creating it if needed
    pub fn open_in(dir: &Path) -> Result<Self, CacheError> {
        fs::create_dir_all(dir).map_err(CacheError::io("create", dir))?;

        Ok(Self {
            dir: dir.to_path_buf(),
            _entry: PhantomData,
        })
    }

    fn entry_path(&self, identifier: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_name(identifier)))
    }

    /// Loads the entry stored under `identifier`
    ///
    /// A missing entry is `Ok(None)`; an unreadable or corrupt one is an error.
    pub fn load(&self, identifier: &str) -> Result<Option<T>, CacheError> {
        let path = self.entry_path(identifier);

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io("read", &path)(e)),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| CacheError::Corrupt { path, source })
    }

    /// Replaces the entry stored under `identifier`
    pub fn store(&self, identifier: &str, data: &T) -> Result<(), CacheError> {
        let path = self.entry_path(identifier);
        let staging = path.with_extension("json.tmp");

        let content = serde_json::to_string_pretty(data)?;
        fs::write(&staging, content).map_err(CacheError::io("write", &staging))?;
        fs::rename(&staging, &path).map_err(CacheError::io("replace", &path))
    }

    /// Removes the storage directory with every entry in it
    pub fn clear(&self) -> Result<(), CacheError> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io("remove", &self.dir)(e)),
        }
    }
}

/// Lowercases `name` and replaces everything but a-z, 0-9 and `-` with `_`
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c.to_ascii_lowercase() {
            c @ ('a'..='z' | '0'..='9' | '-') => c,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Crunchyroll"), "crunchyroll");
        assert_eq!(sanitize_name("With Spaces"), "with_spaces");
        assert_eq!(sanitize_name("With-Hyphens"), "with-hyphens");
        assert_eq!(sanitize_name("user@example.com"), "user_example_com");
    }

    #[test]
    fn test_store_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache: CacheStorage<Vec<String>> = CacheStorage::open_in(dir.path()).unwrap();

        assert!(cache.load("daisuki").unwrap().is_none());

        cache
            .store("daisuki", &vec!["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(
            cache.load("daisuki").unwrap(),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert!(!dir.path().join("daisuki.json.tmp").exists());

        cache.store("daisuki", &vec![]).unwrap();
        assert_eq!(cache.load("daisuki").unwrap(), Some(vec![]));
    }

    #[test]
    fn test_corrupt_entry_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache: CacheStorage<Vec<String>> = CacheStorage::open_in(dir.path()).unwrap();
        fs::write(dir.path().join("broken.json"), "{not json").unwrap();

        assert!(matches!(
            cache.load("broken"),
            Err(CacheError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_clear_removes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("sessions");
        let cache: CacheStorage<Vec<String>> = CacheStorage::open_in(&root).unwrap();
        cache.store("one", &vec![]).unwrap();

        cache.clear().unwrap();
        assert!(!root.exists());
        cache.clear().unwrap();
    }
}
