use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object already exists: {0}")]
    AlreadyExists(String),
    #[error("Invalid object key: {0}")]
    InvalidKey(String),
}

/// Where uploaded bytes live. Keys are relative, slash-separated paths.
pub trait ObjectStorage: Send + Sync {
    /// Stores `bytes` under `key` and returns the public URL. Never overwrites.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<String, StorageError>;
    fn delete(&self, key: &str) -> Result<(), StorageError>;
    /// Inverse of the URL returned by `put`, for URLs this storage produced.
    fn key_for_url(&self, url: &str) -> Option<String>;
}

/// Object key in the `{bucket_prefix}/{kind}/{timestamp}{ext}` layout.
pub fn object_key(bucket_prefix: &str, kind: &str, timestamp_nanos: i64, ext: &str) -> String {
    format!("{}/{}/{}{}", bucket_prefix.trim_matches('/'), kind, timestamp_nanos, ext)
}

/// Files under a media directory that actix-files serves at `<public_base_url>/media`.
pub struct LocalObjectStorage {
    root: PathBuf,
    media_url: Url,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Result<Self, StorageError> {
        let base = Url::parse(public_base_url)
            .map_err(|e| StorageError::InvalidKey(format!("public base url '{}': {}", public_base_url, e)))?;
        let media_url = base
            .join("media/")
            .map_err(|e| StorageError::InvalidKey(format!("public base url '{}': {}", public_base_url, e)))?;
        Ok(LocalObjectStorage { root: root.into(), media_url })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let safe = !key.is_empty() && relative.components().all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

/// Creates `path` only if it does not exist yet and fills it. A failed fill removes
/// the partial file so the key stays free.
fn create_exclusive(
    path: &Path,
    key: &str,
    fill: impl FnOnce(&mut fs::File) -> std::io::Result<()>,
) -> Result<(), StorageError> {
    let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Err(StorageError::AlreadyExists(key.to_string())),
        Err(e) => return Err(e.into()),
    };
    if let Err(e) = fill(&mut file) {
        drop(file);
        if let Err(cleanup) = fs::remove_file(path) {
            log::warn!("Could not remove partial object '{}': {}", key, cleanup);
        }
        return Err(e.into());
    }
    Ok(())
}

impl ObjectStorage for LocalObjectStorage {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<String, StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        create_exclusive(&path, key, |file| {
            file.write_all(bytes)?;
            file.sync_all()
        })?;
        self.media_url.join(key).map(String::from).map_err(|e| StorageError::InvalidKey(format!("{}: {}", key, e)))
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn key_for_url(&self, url: &str) -> Option<String> {
        url.strip_prefix(self.media_url.as_str()).map(str::to_string)
    }
}
