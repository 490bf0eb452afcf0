//! In-memory collaborators for unit tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::audit::{AuditEvent, Auditor};
use super::storage::BlobStore;
use crate::{FolioError, Result};

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
    fail_deletes: AtomicBool,
    fail_puts: AtomicBool,
    delete_calls: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Stored paths in sorted order.
    pub fn paths(&self) -> Vec<String> {
        self.blobs.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, path: &str, content: &[u8], _content_type: &str) -> Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(FolioError::Storage("put refused".to_string()));
        }
        self.blobs
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_vec());
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| FolioError::NotFound(format!("blob {path}")))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(FolioError::Storage("delete refused".to_string()));
        }
        self.blobs.lock().unwrap().remove(path);
        Ok(())
    }

    fn url_for(&self, path: &str) -> String {
        format!("memory://{path}")
    }
}

#[derive(Default)]
pub struct RecordingAuditor {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Auditor for RecordingAuditor {
    fn record(&self, event: &AuditEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
