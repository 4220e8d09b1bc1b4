//! Key-based object storage for uploads (avatars, restaurant covers).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

/// Error type for object storage operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("invalid object path {0:?}")]
    InvalidPath(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("storage lock poisoned")]
    Poisoned,
}

/// Trait for a bucket of binary objects addressed by path.
pub trait ObjectStorage: Send + Sync {
    /// Store (or replace) an object and return its public URL.
    fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, StorageError>;

    /// Public URL of an object, whether or not it exists.
    fn public_url(&self, path: &str) -> Result<String, StorageError>;

    fn download(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Remove an object. Returns true if it existed.
    fn remove(&self, path: &str) -> Result<bool, StorageError>;
}

struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

/// In-memory bucket. Clone-friendly via `Arc`.
#[derive(Clone)]
pub struct InMemoryBucket {
    name: String,
    base_url: String,
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
}

impl InMemoryBucket {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self, path: &str) -> Option<String> {
        self.objects
            .read()
            .ok()?
            .get(path)
            .map(|o| o.content_type.clone())
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate_path(path: &str) -> Result<(), StorageError> {
    let bad = path.is_empty()
        || path.starts_with('/')
        || path.split('/').any(|seg| seg.is_empty() || seg == "..");
    if bad {
        Err(StorageError::InvalidPath(path.to_string()))
    } else {
        Ok(())
    }
}

impl ObjectStorage for InMemoryBucket {
    fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, StorageError> {
        validate_path(path)?;
        let size = bytes.len();
        self.objects
            .write()
            .map_err(|_| StorageError::Poisoned)?
            .insert(
                path.to_string(),
                StoredObject {
                    bytes,
                    content_type: content_type.to_string(),
                },
            );
        debug!(bucket = %self.name, path, size, "object uploaded");
        self.public_url(path)
    }

    fn public_url(&self, path: &str) -> Result<String, StorageError> {
        validate_path(path)?;
        Ok(format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.name, path
        ))
    }

    fn download(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        validate_path(path)?;
        self.objects
            .read()
            .map_err(|_| StorageError::Poisoned)?
            .get(path)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    fn remove(&self, path: &str) -> Result<bool, StorageError> {
        validate_path(path)?;
        Ok(self
            .objects
            .write()
            .map_err(|_| StorageError::Poisoned)?
            .remove(path)
            .is_some())
    }
}
