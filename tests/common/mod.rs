//! Shared setup for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use folio::{BlobStore, Database, FolioError, FsBlobStore, Result};
use tempfile::TempDir;

/// A file-backed database and blob store in a temporary directory.
pub struct TestLibrary {
    pub db: Database,
    pub blobs: FsBlobStore,
    dir: TempDir,
}

impl TestLibrary {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path().join("folio.db"), 4).await.unwrap();
        let blobs = FsBlobStore::new(dir.path().join("blobs"))
            .await
            .unwrap()
            .with_base_url("https://files.example.com");
        Self { db, blobs, dir }
    }

    pub fn dir(&self) -> &std::path::Path {
        self.dir.path()
    }
}

/// Blob store wrapper whose deletes can be switched to fail.
pub struct FlakyBlobStore {
    inner: FsBlobStore,
    fail_deletes: AtomicBool,
}

impl FlakyBlobStore {
    pub fn new(inner: FsBlobStore) -> Self {
        Self {
            inner,
            fail_deletes: AtomicBool::new(false),
        }
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub async fn exists(&self, path: &str) -> bool {
        self.inner.exists(path).await
    }
}

#[async_trait]
impl BlobStore for FlakyBlobStore {
    async fn put(&self, path: &str, content: &[u8], content_type: &str) -> Result<()> {
        self.inner.put(path, content, content_type).await
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        self.inner.get(path).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(FolioError::Storage("blob backend unavailable".to_string()));
        }
        self.inner.delete(path).await
    }

    fn url_for(&self, path: &str) -> String {
        self.inner.url_for(path)
    }
}
