//! Key/value storage backends.
//!
//! A backend persists opaque string blobs under string keys. The file backend is the persistent
//! variant (one file per key under a data directory); the memory backend is used as a fallback
//! when the data directory is unusable, and in tests.

use crate::database::types::DatabaseError;

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Key/value persistence primitive.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read the blob stored under `key`, `None` if nothing was ever stored.
    async fn get(&self, key: &str) -> Result<Option<String>, DatabaseError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<(), DatabaseError>;

    /// Remove the blob stored under `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), DatabaseError>;

    /// Name of the backend for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// File-based backend storing each key as `<data_dir>/<key>.json`.
pub struct FileStorageBackend {
    data_dir: PathBuf,
}

impl FileStorageBackend {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn get_key_filename(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", key))
    }
}

#[async_trait::async_trait]
impl StorageBackend for FileStorageBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        match tokio::fs::read_to_string(self.get_key_filename(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        tokio::fs::create_dir_all(&self.data_dir).await?;

        // Write to a sibling file first so a crash never leaves a truncated slot behind
        let filename = self.get_key_filename(key);
        let tmp_filename = self.data_dir.join(format!("{}.json.tmp", key));
        tokio::fs::write(&tmp_filename, value).await?;
        tokio::fs::rename(&tmp_filename, &filename).await?;

        log::debug!("Stored {} bytes under {:?}", value.len(), filename);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), DatabaseError> {
        match tokio::fs::remove_file(self.get_key_filename(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

/// In-memory backend. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryStorageBackend {
    slots: RwLock<HashMap<String, String>>,
}

impl MemoryStorageBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl StorageBackend for MemoryStorageBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        Ok(self.slots.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.slots
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), DatabaseError> {
        self.slots.write().await.remove(key);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Open the persistent backend for `data_dir`, falling back to memory if the directory cannot
/// be created.
pub async fn open_backend(data_dir: &Path) -> Box<dyn StorageBackend> {
    match tokio::fs::create_dir_all(data_dir).await {
        Ok(()) => {
            log::info!("Using file storage backend at {:?}", data_dir);
            Box::new(FileStorageBackend::new(data_dir.to_path_buf()))
        }
        Err(e) => {
            log::warn!(
                "Data directory {:?} unavailable ({}), falling back to in-memory storage",
                data_dir,
                e
            );
            Box::new(MemoryStorageBackend::new())
        }
    }
}
