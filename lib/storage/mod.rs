use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use log::info;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid object key: {0:?}")]
    InvalidKey(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Could not access bucket object: {0}")]
    Io(#[from] io::Error),
}

/// Durable put/get by key.
pub trait ObjectStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<u8>, StorageError>>;
    fn put<'a>(&'a self, key: &'a str, data: Vec<u8>) -> BoxFuture<'a, Result<(), StorageError>>;
}

impl<T> ObjectStore for Arc<T>
where
    T: ObjectStore + ?Sized,
{
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<u8>, StorageError>> {
        (**self).get(key)
    }

    fn put<'a>(&'a self, key: &'a str, data: Vec<u8>) -> BoxFuture<'a, Result<(), StorageError>> {
        (**self).put(key, data)
    }
}

/// Keys are single path segments; anything that could escape the bucket is rejected.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let invalid = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains('/')
        || key.contains('\\')
        || key.contains('\0');
    if invalid {
        Err(StorageError::InvalidKey(key.to_string()))
    } else {
        Ok(())
    }
}

/// Stores objects as files under `<root>/<bucket>/<folder><key>`.
pub struct FsObjectStore {
    bucket_dir: PathBuf,
    object_folder: String,
}

impl FsObjectStore {
    pub fn new(root: PathBuf, bucket_name: &str, object_folder: &str) -> Self {
        Self {
            bucket_dir: root.join(bucket_name),
            object_folder: object_folder.to_string(),
        }
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.bucket_dir.join(format!("{}{}", self.object_folder, key))
    }
}

impl ObjectStore for FsObjectStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<u8>, StorageError>> {
        Box::pin(async move {
            validate_key(key)?;
            let path = self.object_path(key);
            info!("Trying to read from {}", path.display());
            match tokio::fs::read(&path).await {
                Ok(data) => {
                    info!("Successfully read {} bytes from {}", data.len(), path.display());
                    Ok(data)
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    Err(StorageError::NotFound(key.to_string()))
                }
                Err(err) => Err(err.into()),
            }
        })
    }

    fn put<'a>(&'a self, key: &'a str, data: Vec<u8>) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            validate_key(key)?;
            let path = self.object_path(key);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, &data).await?;
            info!("Successfully wrote {} bytes to {}", data.len(), path.display());
            Ok(())
        })
    }
}

/// Process-local store for tests and single-node development.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|objects| objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for MemoryObjectStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<u8>, StorageError>> {
        Box::pin(async move {
            validate_key(key)?;
            let objects = self
                .objects
                .read()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "object map poisoned"))?;
            objects
                .get(key)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(key.to_string()))
        })
    }

    fn put<'a>(&'a self, key: &'a str, data: Vec<u8>) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            validate_key(key)?;
            let mut objects = self
                .objects
                .write()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "object map poisoned"))?;
            objects.insert(key.to_string(), data);
            Ok(())
        })
    }
}
