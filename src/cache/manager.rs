//! Artifact store for persisting collections to disk
//!
//! Provides an `ArtifactStore` that writes a collection as a flat JSON array,
//! one file per key. Writes build the complete document first, then replace
//! the previous file in a single rename, so readers see either the old or the
//! new collection and never a torn one.

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::CacheError;

/// Name used for the XDG project directories
const PROJECT_NAME: &str = "feedboard";

/// A collection read back from disk
#[derive(Debug, Clone, PartialEq)]
pub struct CachedCollection<T> {
    /// The stored items, in the order they were written
    pub items: Vec<T>,
    /// When the artifact was last replaced, taken from the file's mtime
    pub written_at: Option<DateTime<Utc>>,
}

/// Reads and writes collections under one directory
///
/// The artifact for key `k` is `<dir>/k.json` and holds a top-level JSON array
/// with no wrapper object, so it stays readable by offline tooling.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    /// Directory where artifacts are stored
    dir: PathBuf,
}

impl ArtifactStore {
    /// Creates a store in the XDG cache directory (`~/.cache/feedboard/` on Linux)
    ///
    /// Returns `None` if the directory cannot be determined (e.g., no home directory).
    pub fn cache() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", PROJECT_NAME)?;
        Some(Self::with_dir(project_dirs.cache_dir().to_path_buf()))
    }

    /// Creates a store in the XDG data directory (`~/.local/share/feedboard/` on Linux)
    ///
    /// Returns `None` if the directory cannot be determined.
    pub fn data() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", PROJECT_NAME)?;
        Some(Self::with_dir(project_dirs.data_dir().to_path_buf()))
    }

    /// Creates a store in a specific directory
    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of the artifact for the given key
    pub fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Temp file for one write; unique per process and call so concurrent
    /// writers never share it
    fn temp_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!(
            ".{}.{}.{:08x}.tmp",
            key,
            std::process::id(),
            rand::random::<u32>()
        ))
    }

    /// Creates the directory (and parents) if it does not exist yet
    fn ensure_dir(&self) -> std::io::Result<()> {
        if !self.dir.is_dir() {
            fs::create_dir_all(&self.dir)?;
        }
        Ok(())
    }

    /// Replaces the artifact for `key` with `items`
    ///
    /// On error the previous artifact, if any, is left as it was.
    pub fn write<T: Serialize>(&self, key: &str, items: &[T]) -> Result<(), CacheError> {
        let mut json = serde_json::to_string_pretty(items)?;
        json.push('\n');

        self.ensure_dir()?;

        let temp = self.temp_path(key);
        if let Err(e) = fs::write(&temp, json) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp, self.path(key)) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Reads the artifact for `key`
    ///
    /// # Returns
    /// * `Ok(None)` if no artifact has been written yet
    /// * `Ok(Some(CachedCollection))` with the stored items
    /// * `Err` if the file exists but cannot be read or parsed
    pub fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CachedCollection<T>>, CacheError> {
        let path = self.path(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let items: Vec<T> = serde_json::from_str(&content)?;
        let written_at = fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .ok()
            .map(DateTime::<Utc>::from);

        Ok(Some(CachedCollection { items, written_at }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestData {
        name: String,
        value: i32,
    }

    fn create_test_store() -> (ArtifactStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = ArtifactStore::with_dir(temp_dir.path().to_path_buf());
        (store, temp_dir)
    }

    fn sample() -> Vec<TestData> {
        vec![
            TestData {
                name: "first".to_string(),
                value: 1,
            },
            TestData {
                name: "second".to_string(),
                value: 2,
            },
        ]
    }

    #[test]
    fn test_write_creates_flat_array_file() {
        let (store, temp_dir) = create_test_store();

        store.write("media", &sample()).expect("Write should succeed");

        let expected_path = temp_dir.path().join("media.json");
        assert!(expected_path.exists(), "Artifact should exist");

        let content = fs::read_to_string(&expected_path).expect("Should read file");
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert!(value.is_array(), "Top level must be a flat array");
        assert_eq!(value.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_write_leaves_no_temp_file() {
        let (store, temp_dir) = create_test_store();

        store.write("media", &sample()).unwrap();

        let names: Vec<String> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["media.json".to_string()]);
    }

    #[test]
    fn test_read_returns_none_for_missing_key() {
        let (store, _temp_dir) = create_test_store();

        let result = store.read::<TestData>("nonexistent_key").unwrap();

        assert!(result.is_none(), "Should return None for missing key");
    }

    #[test]
    fn test_read_returns_written_items_and_timestamp() {
        let (store, _temp_dir) = create_test_store();

        let before = Utc::now() - chrono::Duration::seconds(5);
        store.write("media", &sample()).unwrap();

        let cached = store.read::<TestData>("media").unwrap().expect("Should read artifact");

        assert_eq!(cached.items, sample());
        let written_at = cached.written_at.expect("mtime should be available");
        assert!(written_at >= before);
    }

    #[test]
    fn test_same_items_write_identical_bytes() {
        let (store, temp_dir) = create_test_store();
        let path = temp_dir.path().join("media.json");

        store.write("media", &sample()).unwrap();
        let first = fs::read(&path).unwrap();
        store.write("media", &sample()).unwrap();
        let second = fs::read(&path).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_write_creates_directory_if_missing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let nested_path = temp_dir.path().join("nested").join("cache").join("dir");
        let store = ArtifactStore::with_dir(nested_path.clone());

        store.write("nested_key", &sample()).expect("Write should succeed");
        store.write("nested_key", &sample()).expect("Second write should succeed");

        assert!(nested_path.join("nested_key.json").exists(), "Artifact should exist");
    }

    #[test]
    fn test_overwrite_replaces_whole_collection() {
        let (store, _temp_dir) = create_test_store();

        store.write("media", &sample()).unwrap();
        store.write("media", &sample()[..1]).unwrap();

        let cached = store.read::<TestData>("media").unwrap().unwrap();
        assert_eq!(cached.items.len(), 1, "No entries from the old collection survive");
    }

    #[test]
    fn test_corrupt_artifact_is_an_error() {
        let (store, temp_dir) = create_test_store();
        fs::write(temp_dir.path().join("media.json"), "{not json").unwrap();

        let result = store.read::<TestData>("media");

        assert!(matches!(result, Err(CacheError::Serialization(_))));
    }

    /// Serializes to an error, so the write fails before touching the disk
    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("refused"))
        }
    }

    fn temp_files(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect()
    }

    #[test]
    fn test_failed_write_keeps_previous_artifact() {
        let (store, temp_dir) = create_test_store();
        store.write("media", &sample()).unwrap();

        let result = store.write("media", &[Unserializable]);

        assert!(matches!(result, Err(CacheError::Serialization(_))));
        let cached = store.read::<TestData>("media").unwrap().unwrap();
        assert_eq!(cached.items, sample());
        assert!(temp_files(temp_dir.path()).is_empty());
    }

    #[test]
    fn test_failed_rename_removes_temp_file() {
        let (store, temp_dir) = create_test_store();

        // A directory squatting on the artifact path makes the rename fail
        fs::create_dir(temp_dir.path().join("media.json")).unwrap();
        let result = store.write("media", &sample());

        assert!(matches!(result, Err(CacheError::Io(_))));
        assert!(temp_files(temp_dir.path()).is_empty());
    }

    #[test]
    fn test_temp_paths_are_unique_per_write() {
        let (store, _temp_dir) = create_test_store();

        let first = store.temp_path("media");
        let second = store.temp_path("media");

        assert_ne!(first, second);
        for path in [&first, &second] {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            assert!(name.starts_with(&format!(".media.{}.", std::process::id())), "{}", name);
            assert!(name.ends_with(".tmp"), "{}", name);
        }
    }

    #[test]
    fn test_xdg_paths_contain_project_name() {
        if let Some(store) = ArtifactStore::cache() {
            assert!(store.dir().to_string_lossy().contains(PROJECT_NAME));
        }
        if let Some(store) = ArtifactStore::data() {
            assert!(store.dir().to_string_lossy().contains(PROJECT_NAME));
        }
        // Test passes if no home directory is available (e.g., in CI)
    }
}
