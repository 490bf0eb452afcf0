//! Blob storage for library file content.
//!
//! The metadata store only ever holds an opaque storage path; the bytes live
//! behind a [`BlobStore`]. [`FsBlobStore`] keeps them on the local filesystem.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use uuid::Uuid;

use crate::{FolioError, Result};

/// Opaque, path-addressed binary object storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `content` under `path`, replacing anything already there.
    async fn put(&self, path: &str, content: &[u8], content_type: &str) -> Result<()>;

    /// Read the object at `path`. Missing objects are [`FolioError::NotFound`].
    async fn get(&self, path: &str) -> Result<Vec<u8>>;

    /// Delete the object at `path`. Deleting a missing object succeeds.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Public URL for the object at `path`.
    fn url_for(&self, path: &str) -> String;
}

/// Longest extension carried over from an uploaded name.
const MAX_EXTENSION_LENGTH: usize = 16;

/// Generate a fresh storage path for an upload.
///
/// The path is a random UUID plus the original extension (`bin` when there
/// is none or it is unusable), so it is never reused.
pub fn generate_storage_path(original_name: &str) -> String {
    let uuid = Uuid::new_v4();
    let ext = extract_extension(original_name);
    format!("{uuid}.{ext}")
}

/// Extract the file extension from a filename, defaulting to "bin".
///
/// Only short ASCII alphanumeric extensions are kept, so the result is always
/// a valid single path component.
fn extract_extension(filename: &str) -> &str {
    Path::new(filename)
        .extension()
        .and_then(|s| s.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LENGTH
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .unwrap_or("bin")
}

/// Filesystem blob store.
///
/// Blobs are stored in a sharded directory structure:
/// ```text
/// {base_path}/
/// ├── ab/
/// │   └── ab12cd34-5678-90ab-cdef-123456789012.txt
/// └── cd/
///     └── cd90ab12-3456-7890-abcd-ef1234567890.bin
/// ```
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    base_path: PathBuf,
    base_url: String,
}

impl FsBlobStore {
    /// Create a new FsBlobStore rooted at `base_path`.
    ///
    /// The base directory will be created if it doesn't exist.
    pub async fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;

        Ok(Self {
            base_path,
            base_url: "/files".to_string(),
        })
    }

    /// Set the URL prefix used by [`BlobStore::url_for`].
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Get the base path of this store.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Full filesystem path for a storage path: `{base}/{shard}/{path}`.
    pub fn blob_path(&self, path: &str) -> Result<PathBuf> {
        if path.is_empty()
            || path.contains(['/', '\\'])
            || path == "."
            || path == ".."
        {
            return Err(FolioError::Storage(format!("invalid storage path: {path:?}")));
        }
        Ok(self.base_path.join(Self::shard(path)).join(path))
    }

    /// Check if a blob exists.
    pub async fn exists(&self, path: &str) -> bool {
        match self.blob_path(path) {
            Ok(p) => fs::try_exists(p).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Remove empty shard directories. Returns how many were removed.
    pub async fn cleanup_empty_dirs(&self) -> Result<usize> {
        let mut removed = 0;
        let mut entries = fs::read_dir(&self.base_path).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let mut inner = fs::read_dir(&path).await?;
            if inner.next_entry().await?.is_none() && fs::remove_dir(&path).await.is_ok() {
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// Shard directory name: the first 2 characters of the storage path.
    fn shard(path: &str) -> &str {
        match path.char_indices().nth(2) {
            Some((idx, _)) => &path[..idx],
            None => path,
        }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, path: &str, content: &[u8], _content_type: &str) -> Result<()> {
        let file_path = self.blob_path(path)?;

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&file_path, content).await?;

        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let file_path = self.blob_path(path)?;

        match fs::read(&file_path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(FolioError::NotFound(format!("blob {path}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let file_path = self.blob_path(path)?;

        match fs::remove_file(&file_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}
