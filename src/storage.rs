//! Local document store
//!
//! A directory of JSON documents addressed by fixed string keys. Each key maps
//! to `<data_dir>/<key>.json`. Writes go through a temporary file and a rename
//! so a crash never leaves a half-written document behind.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const API_KEYS_KEY: &str = "modelviz_api_keys";
pub const SESSIONS_KEY: &str = "modelviz_comparison_sessions";
pub const METRICS_KEY: &str = "modelviz_metrics";
pub const BLENDS_KEY: &str = "modelviz_blended_models";
pub const PRICING_KEY: &str = "modelviz_pricing";

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error for '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("Stored value for '{key}' is corrupt: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize value for '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Storage quota exceeded for '{key}': {size} bytes exceeds limit of {limit} bytes")]
    QuotaExceeded { key: String, size: usize, limit: usize },
}

#[derive(Debug, Clone)]
pub struct JsonStore {
    root: PathBuf,
    max_value_bytes: usize,
}

impl JsonStore {
    /// Opens (creating if necessary) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, max_value_kb: usize) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StorageError::Io {
            key: root.display().to_string(),
            source,
        })?;
        Ok(Self {
            root,
            max_value_bytes: max_value_kb * 1024,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Largest document `set` accepts, in bytes.
    pub fn max_value_bytes(&self) -> usize {
        self.max_value_bytes
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", key))
    }

    /// Reads a raw document. Missing keys are `None`.
    pub fn get_raw(&self, key: &str) -> StorageResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        let Some(content) = self.get_raw(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| StorageError::Corrupt {
                key: key.to_string(),
                source,
            })
    }

    /// Reads a document, treating a missing key as `T::default()`.
    pub fn get_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> StorageResult<T> {
        Ok(self.get(key)?.unwrap_or_default())
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StorageResult<()> {
        let content = serde_json::to_string(value).map_err(|source| StorageError::Serialize {
            key: key.to_string(),
            source,
        })?;
        self.set_raw(key, &content)
    }

    pub fn set_raw(&self, key: &str, content: &str) -> StorageResult<()> {
        if content.len() > self.max_value_bytes {
            return Err(StorageError::QuotaExceeded {
                key: key.to_string(),
                size: content.len(),
                limit: self.max_value_bytes,
            });
        }

        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };

        let target = self.path_for(key);
        let tmp = self.root.join(format!(".{}.json.tmp", key));
        fs::write(&tmp, content).map_err(io_err)?;
        fs::rename(&tmp, &target).map_err(io_err)?;

        debug!(key = key, bytes = content.len(), "Stored document");
        Ok(())
    }

    pub fn remove(&self, key: &str) -> StorageResult<bool> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}
