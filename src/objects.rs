//! Object collection gateway: namespace-scoped listing and download of raw documents.

use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;
use walkdir::WalkDir;

/// Errors raised by object stores.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    /// Namespace or object does not exist.
    #[error("Object not found: {0}")]
    NotFound(String),
    /// Underlying storage failed.
    #[error("Object store I/O failed: {0}")]
    Io(#[from] io::Error),
    /// Namespace or object name would escape the store.
    #[error("Invalid namespace or object name: {0}")]
    InvalidNamespace(String),
}

/// Listing entry for one stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Object name, unique within its namespace.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
}

/// Read-only access to a namespaced document collection.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List every object stored under `namespace`, sorted by name.
    async fn list(&self, namespace: &str) -> Result<Vec<ObjectInfo>, ObjectStoreError>;

    /// Fetch the bytes of one object.
    async fn download(&self, namespace: &str, name: &str) -> Result<Vec<u8>, ObjectStoreError>;
}

/// Object store backed by a directory tree: each namespace is a sub-directory of the root and
/// object names are `/`-separated paths relative to it.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Serve objects below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn namespace_dir(&self, namespace: &str) -> Result<PathBuf, ObjectStoreError> {
        if namespace.is_empty()
            || namespace.contains(['/', '\\'])
            || !is_plain_relative(Path::new(namespace))
        {
            return Err(ObjectStoreError::InvalidNamespace(namespace.to_string()));
        }
        Ok(self.root.join(namespace))
    }

    fn object_path(&self, namespace: &str, name: &str) -> Result<PathBuf, ObjectStoreError> {
        let dir = self.namespace_dir(namespace)?;
        if name.is_empty() || !is_plain_relative(Path::new(name)) {
            return Err(ObjectStoreError::InvalidNamespace(format!("{namespace}/{name}")));
        }
        Ok(dir.join(name))
    }
}

fn is_plain_relative(path: &Path) -> bool {
    path.components()
        .all(|component| matches!(component, Component::Normal(_)))
}

fn walk_namespace(dir: &Path) -> Result<Vec<ObjectInfo>, ObjectStoreError> {
    let mut objects = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|error| ObjectStoreError::Io(io::Error::other(error)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let name = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let size = entry
            .metadata()
            .map_err(|error| ObjectStoreError::Io(io::Error::other(error)))?
            .len();
        objects.push(ObjectInfo { name, size });
    }
    objects.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(objects)
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn list(&self, namespace: &str) -> Result<Vec<ObjectInfo>, ObjectStoreError> {
        let dir = self.namespace_dir(namespace)?;
        if !tokio::fs::try_exists(&dir).await? {
            return Err(ObjectStoreError::NotFound(namespace.to_string()));
        }
        tokio::task::spawn_blocking(move || walk_namespace(&dir))
            .await
            .map_err(|error| ObjectStoreError::Io(io::Error::other(error)))?
    }

    async fn download(&self, namespace: &str, name: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let path = self.object_path(namespace, name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                Err(ObjectStoreError::NotFound(format!("{namespace}/{name}")))
            }
            Err(error) => Err(error.into()),
        }
    }
}

/// Object store held entirely in memory.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<(String, String), Vec<u8>>>,
}

impl MemoryObjectStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or replace an object.
    pub fn insert(&self, namespace: &str, name: &str, content: impl Into<Vec<u8>>) {
        self.objects
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert((namespace.to_string(), name.to_string()), content.into());
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, namespace: &str) -> Result<Vec<ObjectInfo>, ObjectStoreError> {
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        Ok(objects
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|((_, name), content)| ObjectInfo {
                name: name.clone(),
                size: content.len() as u64,
            })
            .collect())
    }

    async fn download(&self, namespace: &str, name: &str) -> Result<Vec<u8>, ObjectStoreError> {
        self.objects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound(format!("{namespace}/{name}")))
    }
}
