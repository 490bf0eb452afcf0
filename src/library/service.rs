//! Library service.
//!
//! This module provides the high-level operations a request handler performs:
//! - Folder create/rename/delete with name and depth validation
//! - Upload with size checks and blob compensation
//! - Download, public URLs and folder listings
//!
//! Every mutation is reported to the configured [`Auditor`].

use std::time::Duration;

use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db::DbPool;
use crate::fold::{NameFolder, DEFAULT_NAME_FOLDER};
use crate::{FolioError, Result};

use super::audit::{AuditAction, AuditEvent, AuditTarget, Auditor};
use super::folder::{Folder, FolderRepository, FolderUpdate, NewFolder};
use super::lifecycle::{CascadeOutcome, LifecycleCoordinator};
use super::listing::{FileListOptions, FolderListing, FolderSort};
use super::metadata::{FileEntry, FileRepository, FileUpdate, NewFile};
use super::storage::{generate_storage_path, BlobStore};
use super::{DEFAULT_MAX_FILE_SIZE, MAX_DESCRIPTION_LENGTH, MAX_FOLDER_DEPTH, MAX_NAME_LENGTH};

/// Default deadline for a cascading folder delete.
const DEFAULT_CASCADE_TIMEOUT: Duration = Duration::from_secs(60);

/// Request data for folder creation.
#[derive(Debug, Clone)]
pub struct CreateFolderRequest {
    pub name: String,
    pub description: Option<String>,
    /// Parent folder ID (None for a root folder).
    pub parent_id: Option<i64>,
}

impl CreateFolderRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parent_id: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

/// Request data for file upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Folder ID to upload to (None for the library root).
    pub folder_id: Option<i64>,
    /// Original filename.
    pub name: String,
    pub description: Option<String>,
    /// MIME type; guessed from the name when absent.
    pub content_type: Option<String>,
    pub content: Vec<u8>,
}

impl UploadRequest {
    /// Create a new upload request.
    pub fn new(folder_id: Option<i64>, name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            folder_id,
            name: name.into(),
            description: None,
            content_type: None,
            content,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Result of a file download.
#[derive(Debug)]
pub struct Download {
    pub file: FileEntry,
    pub content: Vec<u8>,
}

/// Folder and file operations over one database and one blob backend.
pub struct LibraryService<'a> {
    pool: &'a DbPool,
    blobs: &'a dyn BlobStore,
    auditor: &'a dyn Auditor,
    folder: &'a dyn NameFolder,
    max_file_size: u64,
    max_folder_depth: usize,
    cascade_timeout: Duration,
}

impl<'a> LibraryService<'a> {
    /// Create a new LibraryService with default limits.
    pub fn new(pool: &'a DbPool, blobs: &'a dyn BlobStore, auditor: &'a dyn Auditor) -> Self {
        Self {
            pool,
            blobs,
            auditor,
            folder: &DEFAULT_NAME_FOLDER,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_folder_depth: MAX_FOLDER_DEPTH,
            cascade_timeout: DEFAULT_CASCADE_TIMEOUT,
        }
    }

    /// Apply the limits from `[files]` and `[library]`.
    pub fn configure(self, config: &Config) -> Self {
        self.with_max_file_size(config.files.max_upload_bytes())
            .with_max_folder_depth(config.library.max_folder_depth)
            .with_cascade_timeout(config.library.cascade_timeout())
    }

    pub fn with_name_folder(mut self, folder: &'a dyn NameFolder) -> Self {
        self.folder = folder;
        self
    }

    pub fn with_max_file_size(mut self, max_size: u64) -> Self {
        self.max_file_size = max_size;
        self
    }

    /// Maximum number of folder levels, root level included.
    pub fn with_max_folder_depth(mut self, depth: usize) -> Self {
        self.max_folder_depth = depth;
        self
    }

    pub fn with_cascade_timeout(mut self, timeout: Duration) -> Self {
        self.cascade_timeout = timeout;
        self
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    fn folders(&self) -> FolderRepository<'a> {
        FolderRepository::new(self.pool).with_name_folder(self.folder)
    }

    fn files(&self) -> FileRepository<'a> {
        FileRepository::new(self.pool).with_name_folder(self.folder)
    }

    fn audit(
        &self,
        actor_id: i64,
        target: AuditTarget,
        action: AuditAction,
        details: serde_json::Value,
    ) {
        self.auditor
            .record(&AuditEvent::new(actor_id, target, action, details));
    }

    /// Create a folder.
    ///
    /// # Validation
    /// - Name: trimmed, non-empty, no `/`, max 100 characters
    /// - Description: max 500 characters
    /// - Parent must exist and the new folder must fit the depth limit
    /// - No sibling with the same folded name
    pub async fn create_folder(
        &self,
        request: &CreateFolderRequest,
        actor_id: i64,
    ) -> Result<Folder> {
        let name = validate_name("folder", &request.name)?;
        let description = validate_description(request.description.as_deref())?;
        let folders = self.folders();

        if let Some(parent_id) = request.parent_id {
            let depth = folders.get_depth(parent_id).await?;
            // Levels are counted from 1 at the root; the new folder sits at depth + 2.
            if depth + 2 > self.max_folder_depth {
                return Err(FolioError::Validation(format!(
                    "folders can be nested at most {} levels deep",
                    self.max_folder_depth
                )));
            }
        }

        if folders
            .name_exists_in_parent(&name, request.parent_id, None)
            .await?
        {
            return Err(FolioError::Conflict(format!(
                "a folder named '{name}' already exists here"
            )));
        }

        let mut new_folder = NewFolder::new(name, actor_id).in_parent(request.parent_id);
        new_folder.description = description;
        let folder = folders.create(&new_folder).await?;

        info!(
            folder_id = folder.id,
            name = %folder.name,
            parent_id = ?folder.parent_id,
            "folder created"
        );
        self.audit(
            actor_id,
            AuditTarget::Folder(folder.id),
            AuditAction::Create,
            json!({ "name": folder.name, "parent_id": folder.parent_id }),
        );

        Ok(folder)
    }

    /// Rename a folder and/or change its description.
    pub async fn update_folder(
        &self,
        id: i64,
        update: &FolderUpdate,
        actor_id: i64,
    ) -> Result<Folder> {
        let folders = self.folders();
        let current = folders.get(id).await?;
        let update = FolderUpdate {
            name: update
                .name
                .as_deref()
                .map(|n| validate_name("folder", n))
                .transpose()?,
            description: update
                .description
                .as_ref()
                .map(|d| validate_description(d.as_deref()))
                .transpose()?,
        };

        if let Some(ref name) = update.name {
            if folders
                .name_exists_in_parent(name, current.parent_id, Some(id))
                .await?
            {
                return Err(FolioError::Conflict(format!(
                    "a folder named '{name}' already exists here"
                )));
            }
        }

        let folder = folders.update(id, &update).await?;

        self.audit(
            actor_id,
            AuditTarget::Folder(id),
            AuditAction::Update,
            json!({ "old_name": current.name, "name": folder.name }),
        );

        Ok(folder)
    }

    /// Delete a folder and everything inside it.
    ///
    /// The cascade runs under the configured deadline; running out of time
    /// is a storage error. An aborted cascade is returned as
    /// [`FolioError::PartialFailure`].
    pub async fn delete_folder(&self, id: i64, actor_id: i64) -> Result<CascadeOutcome> {
        let coordinator =
            LifecycleCoordinator::new(self.pool, self.blobs).with_name_folder(self.folder);

        let cascade = tokio::time::timeout(self.cascade_timeout, coordinator.delete_folder(id));
        let outcome = match cascade.await {
            Ok(result) => result?,
            Err(_) => {
                error!(
                    folder_id = id,
                    timeout = ?self.cascade_timeout,
                    "cascading folder delete timed out"
                );
                return Err(FolioError::Storage(format!(
                    "deleting folder {id} timed out after {}s",
                    self.cascade_timeout.as_secs_f64()
                )));
            }
        };

        // Whatever was removed is audited, even when the cascade stopped early.
        self.audit(
            actor_id,
            AuditTarget::Folder(id),
            AuditAction::Delete,
            json!({
                "folders_deleted": outcome.folders_deleted,
                "files_deleted": outcome.files_deleted,
                "orphaned_blobs": outcome.files_orphaned_in_blob_store.len(),
                "first_error": outcome.first_error,
            }),
        );

        outcome.into_result()
    }

    /// Upload a file.
    ///
    /// # Validation
    /// - Name: trimmed, non-empty, no `/`, max 100 characters
    /// - Description: max 500 characters
    /// - File size: max configured size (default 10MB)
    ///
    /// The blob is written first. If the metadata insert then fails, the blob
    /// is removed again.
    pub async fn upload_file(&self, request: &UploadRequest, actor_id: i64) -> Result<FileEntry> {
        let name = validate_name("file", &request.name)?;
        let description = validate_description(request.description.as_deref())?;

        if request.content.len() as u64 > self.max_file_size {
            return Err(FolioError::Validation(format!(
                "file is too large (max {} bytes)",
                self.max_file_size
            )));
        }

        if let Some(folder_id) = request.folder_id {
            self.folders().get(folder_id).await?;
        }

        let files = self.files();
        if files
            .name_exists_in_folder(&name, request.folder_id, None)
            .await?
        {
            return Err(FolioError::Conflict(format!(
                "a file named '{name}' already exists here"
            )));
        }

        let content_type = match request.content_type.as_deref().map(str::trim) {
            Some(ct) if !ct.is_empty() => ct.to_string(),
            _ => mime_guess::from_path(&name)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
        };

        let storage_path = generate_storage_path(&name);
        self.blobs
            .put(&storage_path, &request.content, &content_type)
            .await?;

        let mut new_file = NewFile::new(
            request.folder_id,
            name,
            storage_path.clone(),
            request.content.len() as i64,
            content_type,
            actor_id,
        );
        new_file.description = description;

        let file = match files.create(&new_file).await {
            Ok(file) => file,
            Err(e) => {
                if let Err(cleanup) = self.blobs.delete(&storage_path).await {
                    warn!(
                        storage_path = %storage_path,
                        error = %cleanup,
                        "could not remove blob of failed upload"
                    );
                }
                return Err(e);
            }
        };

        info!(file_id = file.id, name = %file.name, size = file.size, "file uploaded");
        self.audit(
            actor_id,
            AuditTarget::File(file.id),
            AuditAction::Create,
            json!({ "name": file.name, "folder_id": file.folder_id, "size": file.size }),
        );

        Ok(file)
    }

    /// Rename a file and/or change its description.
    pub async fn update_file(
        &self,
        id: i64,
        update: &FileUpdate,
        actor_id: i64,
    ) -> Result<FileEntry> {
        let files = self.files();
        let current = files.get(id).await?;
        let update = FileUpdate {
            name: update
                .name
                .as_deref()
                .map(|n| validate_name("file", n))
                .transpose()?,
            description: update
                .description
                .as_ref()
                .map(|d| validate_description(d.as_deref()))
                .transpose()?,
        };

        if let Some(ref name) = update.name {
            if files
                .name_exists_in_folder(name, current.folder_id, Some(id))
                .await?
            {
                return Err(FolioError::Conflict(format!(
                    "a file named '{name}' already exists here"
                )));
            }
        }

        let file = files.update(id, &update).await?;

        self.audit(
            actor_id,
            AuditTarget::File(id),
            AuditAction::Update,
            json!({ "old_name": current.name, "name": file.name }),
        );

        Ok(file)
    }

    /// Delete a file. A blob that cannot be removed is logged and left behind.
    ///
    /// Only a delete that actually removed the row is audited.
    pub async fn delete_file(&self, id: i64, actor_id: i64) -> Result<()> {
        let files = self.files();
        let file = files.get(id).await?;

        if let Err(e) = self.blobs.delete(&file.storage_path).await {
            warn!(
                file_id = id,
                storage_path = %file.storage_path,
                error = %e,
                "blob delete failed, leaving orphan"
            );
        }
        if !files.delete(id).await? {
            debug!(file_id = id, "file row already gone, nothing to audit");
            return Ok(());
        }

        self.audit(
            actor_id,
            AuditTarget::File(id),
            AuditAction::Delete,
            json!({ "name": file.name, "folder_id": file.folder_id }),
        );

        Ok(())
    }

    /// Download a file's metadata and content.
    pub async fn download(&self, id: i64) -> Result<Download> {
        let file = self.files().get(id).await?;
        let content = self.blobs.get(&file.storage_path).await?;
        Ok(Download { file, content })
    }

    /// Public URL of a file's content.
    pub async fn file_url(&self, id: i64) -> Result<String> {
        let file = self.files().get(id).await?;
        Ok(self.blobs.url_for(&file.storage_path))
    }

    /// List a folder (`None` for the library root): subfolders, then files.
    pub async fn list_folder(
        &self,
        folder_id: Option<i64>,
        sort: FolderSort,
        options: &FileListOptions,
    ) -> Result<FolderListing> {
        let folders = self.folders();
        let path = match folder_id {
            Some(id) => folders.get_path(id).await?,
            None => Vec::new(),
        };

        let subfolders = folders.list_by_parent(folder_id, sort).await?;
        let files = self.files().list_by_folder(folder_id, options).await?;
        let total_size = files.iter().map(|f| f.size).sum();

        Ok(FolderListing {
            folder: path.last().cloned(),
            path,
            folders: subfolders,
            files,
            total_size,
        })
    }

    /// Path from the root to a folder, inclusive.
    pub async fn breadcrumbs(&self, id: i64) -> Result<Vec<Folder>> {
        self.folders().get_path(id).await
    }

    /// Whether a sibling folder already uses this (folded) name.
    pub async fn folder_name_exists(
        &self,
        name: &str,
        parent_id: Option<i64>,
        exclude_id: Option<i64>,
    ) -> Result<bool> {
        self.folders()
            .name_exists_in_parent(name.trim(), parent_id, exclude_id)
            .await
    }

    /// Whether a file in the folder already uses this (folded) name.
    pub async fn file_name_exists(
        &self,
        name: &str,
        folder_id: Option<i64>,
        exclude_id: Option<i64>,
    ) -> Result<bool> {
        self.files()
            .name_exists_in_folder(name.trim(), folder_id, exclude_id)
            .await
    }
}

fn validate_name(kind: &str, name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(FolioError::Validation(format!("{kind} name is required")));
    }
    if name.contains('/') {
        return Err(FolioError::Validation(format!(
            "{kind} name must not contain '/'"
        )));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(FolioError::Validation(format!(
            "{kind} name must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(name.to_string())
}

/// Trimmed description; blank becomes `None`.
fn validate_description(description: Option<&str>) -> Result<Option<String>> {
    let Some(description) = description.map(str::trim) else {
        return Ok(None);
    };
    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(FolioError::Validation(format!(
            "description must be at most {MAX_DESCRIPTION_LENGTH} characters"
        )));
    }
    Ok((!description.is_empty()).then(|| description.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::testing::{MemoryBlobStore, RecordingAuditor};
    use crate::library::{CascadeStep, FileSortBy, SortOrder};
    use crate::Database;
    use async_trait::async_trait;

    async fn setup() -> (Database, MemoryBlobStore, RecordingAuditor) {
        let db = Database::open_in_memory().await.unwrap();
        (db, MemoryBlobStore::new(), RecordingAuditor::new())
    }

    async fn folder(service: &LibraryService<'_>, name: &str, parent: Option<i64>) -> Folder {
        let mut request = CreateFolderRequest::new(name);
        request.parent_id = parent;
        service.create_folder(&request, 1).await.unwrap()
    }

    async fn upload(service: &LibraryService<'_>, folder_id: Option<i64>, name: &str) -> FileEntry {
        service
            .upload_file(&UploadRequest::new(folder_id, name, name.as_bytes().to_vec()), 1)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_folder_trims_and_audits() {
        let (db, blobs, auditor) = setup().await;
        let service = LibraryService::new(db.pool(), &blobs, &auditor);

        let created = service
            .create_folder(
                &CreateFolderRequest::new("  Reports  ").with_description("   "),
                42,
            )
            .await
            .unwrap();

        assert_eq!(created.name, "Reports");
        assert_eq!(created.description, None);
        assert_eq!(created.created_by_id, 42);

        let events = auditor.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].actor_id, 42);
        assert_eq!(events[0].target, AuditTarget::Folder(created.id));
        assert_eq!(events[0].action, AuditAction::Create);
    }

    #[tokio::test]
    async fn test_create_folder_rejects_bad_names() {
        let (db, blobs, auditor) = setup().await;
        let service = LibraryService::new(db.pool(), &blobs, &auditor);

        let too_long = "x".repeat(MAX_NAME_LENGTH + 1);
        for bad in ["", "   ", "a/b", too_long.as_str()] {
            let result = service.create_folder(&CreateFolderRequest::new(bad), 1).await;
            assert!(matches!(result, Err(FolioError::Validation(_))), "{bad:?}");
        }

        let long_desc = "d".repeat(MAX_DESCRIPTION_LENGTH + 1);
        let result = service
            .create_folder(&CreateFolderRequest::new("Ok").with_description(long_desc), 1)
            .await;
        assert!(matches!(result, Err(FolioError::Validation(_))));
        assert!(auditor.events().is_empty());
    }

    #[tokio::test]
    async fn test_create_folder_conflict_is_folded() {
        let (db, blobs, auditor) = setup().await;
        let service = LibraryService::new(db.pool(), &blobs, &auditor);

        folder(&service, "Café", None).await;
        let result = service
            .create_folder(&CreateFolderRequest::new("CAFE"), 1)
            .await;
        let err = result.unwrap_err();
        assert!(matches!(err, FolioError::Conflict(_)));
        assert!(err.is_user_facing());
    }

    #[tokio::test]
    async fn test_create_folder_missing_parent() {
        let (db, blobs, auditor) = setup().await;
        let service = LibraryService::new(db.pool(), &blobs, &auditor);

        let result = service
            .create_folder(&CreateFolderRequest::new("Orphan").with_parent(404), 1)
            .await;
        assert!(matches!(result, Err(FolioError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_create_folder_depth_limit() {
        let (db, blobs, auditor) = setup().await;
        let service = LibraryService::new(db.pool(), &blobs, &auditor).with_max_folder_depth(3);

        let l1 = folder(&service, "L1", None).await;
        let l2 = folder(&service, "L2", Some(l1.id)).await;
        let l3 = folder(&service, "L3", Some(l2.id)).await;

        let result = service
            .create_folder(&CreateFolderRequest::new("L4").with_parent(l3.id), 1)
            .await;
        assert!(matches!(result, Err(FolioError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_folder_rename() {
        let (db, blobs, auditor) = setup().await;
        let service = LibraryService::new(db.pool(), &blobs, &auditor);

        let a = folder(&service, "Alpha", None).await;
        folder(&service, "Beta", None).await;

        // Case-only rename of itself is fine.
        let renamed = service
            .update_folder(a.id, &FolderUpdate::new().name("ALPHA"), 2)
            .await
            .unwrap();
        assert_eq!(renamed.name, "ALPHA");

        let result = service
            .update_folder(a.id, &FolderUpdate::new().name("beta"), 2)
            .await;
        assert!(matches!(result, Err(FolioError::Conflict(_))));

        let result = service
            .update_folder(a.id, &FolderUpdate::new().name(" "), 2)
            .await;
        assert!(matches!(result, Err(FolioError::Validation(_))));

        let last = auditor.events().pop().unwrap();
        assert_eq!(last.action, AuditAction::Update);
        assert_eq!(last.target, AuditTarget::Folder(a.id));
    }

    #[tokio::test]
    async fn test_upload_and_download() {
        let (db, blobs, auditor) = setup().await;
        let service = LibraryService::new(db.pool(), &blobs, &auditor);
        let docs = folder(&service, "Docs", None).await;

        let request = UploadRequest::new(Some(docs.id), " report.pdf ", b"%PDF-1.4".to_vec())
            .with_description("Quarterly");
        let file = service.upload_file(&request, 7).await.unwrap();

        assert_eq!(file.name, "report.pdf");
        assert_eq!(file.content_type, "application/pdf");
        assert_eq!(file.size, 8);
        assert_eq!(file.description, Some("Quarterly".to_string()));
        assert!(file.storage_path.ends_with(".pdf"));

        let download = service.download(file.id).await.unwrap();
        assert_eq!(download.content, b"%PDF-1.4");
        assert_eq!(download.file.id, file.id);

        assert_eq!(
            service.file_url(file.id).await.unwrap(),
            format!("memory://{}", file.storage_path)
        );
    }

    #[tokio::test]
    async fn test_upload_content_type_fallbacks() {
        let (db, blobs, auditor) = setup().await;
        let service = LibraryService::new(db.pool(), &blobs, &auditor);

        let unknown = upload(&service, None, "blob.zzzunknown").await;
        assert_eq!(unknown.content_type, "application/octet-stream");

        let explicit = service
            .upload_file(
                &UploadRequest::new(None, "notes", b"x".to_vec())
                    .with_content_type("text/markdown"),
                1,
            )
            .await
            .unwrap();
        assert_eq!(explicit.content_type, "text/markdown");
    }

    #[tokio::test]
    async fn test_upload_validation() {
        let (db, blobs, auditor) = setup().await;
        let service = LibraryService::new(db.pool(), &blobs, &auditor).with_max_file_size(4);

        let too_big = UploadRequest::new(None, "big.bin", vec![0u8; 5]);
        assert!(matches!(
            service.upload_file(&too_big, 1).await,
            Err(FolioError::Validation(_))
        ));

        let missing_folder = UploadRequest::new(Some(99), "a.txt", vec![1]);
        assert!(matches!(
            service.upload_file(&missing_folder, 1).await,
            Err(FolioError::NotFound(_))
        ));

        upload(&service, None, "doc.pdf").await;
        let duplicate = UploadRequest::new(None, "DOC.PDF", vec![1]);
        assert!(matches!(
            service.upload_file(&duplicate, 1).await,
            Err(FolioError::Conflict(_))
        ));

        assert_eq!(blobs.paths().len(), 1);
    }

    #[tokio::test]
    async fn test_upload_blob_failure_leaves_no_metadata() {
        let (db, blobs, auditor) = setup().await;
        let service = LibraryService::new(db.pool(), &blobs, &auditor);
        blobs.fail_puts(true);

        let result = service
            .upload_file(&UploadRequest::new(None, "a.txt", vec![1]), 1)
            .await;
        assert!(matches!(result, Err(FolioError::Storage(_))));
        assert_eq!(FileRepository::new(db.pool()).count_by_folder(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upload_metadata_failure_removes_blob() {
        let (db, blobs, auditor) = setup().await;
        let service = LibraryService::new(db.pool(), &blobs, &auditor);
        sqlx::raw_sql(
            "CREATE TRIGGER reject_insert BEFORE INSERT ON files
             BEGIN SELECT RAISE(ABORT, 'insert refused'); END;",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let result = service
            .upload_file(&UploadRequest::new(None, "a.txt", vec![1]), 1)
            .await;
        assert!(matches!(result, Err(FolioError::Database(_))));
        assert!(blobs.paths().is_empty());
        assert_eq!(blobs.delete_calls(), 1);
        assert!(auditor.events().is_empty());
    }

    #[tokio::test]
    async fn test_update_file() {
        let (db, blobs, auditor) = setup().await;
        let service = LibraryService::new(db.pool(), &blobs, &auditor);
        let a = upload(&service, None, "a.txt").await;
        upload(&service, None, "b.txt").await;

        let updated = service
            .update_file(
                a.id,
                &FileUpdate::new().name("renamed.txt").description(Some("new")),
                3,
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "renamed.txt");
        assert_eq!(updated.description, Some("new".to_string()));
        assert_eq!(updated.storage_path, a.storage_path);

        let cleared = service
            .update_file(a.id, &FileUpdate::new().description(None::<String>), 3)
            .await
            .unwrap();
        assert_eq!(cleared.description, None);

        let result = service
            .update_file(a.id, &FileUpdate::new().name("B.TXT"), 3)
            .await;
        assert!(matches!(result, Err(FolioError::Conflict(_))));

        let result = service
            .update_file(999, &FileUpdate::new().name("x.txt"), 3)
            .await;
        assert!(matches!(result, Err(FolioError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_file_tolerates_blob_failure() {
        let (db, blobs, auditor) = setup().await;
        let service = LibraryService::new(db.pool(), &blobs, &auditor);
        let file = upload(&service, None, "a.txt").await;
        blobs.fail_deletes(true);

        service.delete_file(file.id, 5).await.unwrap();

        assert!(matches!(
            service.download(file.id).await,
            Err(FolioError::NotFound(_))
        ));
        assert_eq!(blobs.paths(), vec![file.storage_path]);

        let last = auditor.events().pop().unwrap();
        assert_eq!(last.target, AuditTarget::File(file.id));
        assert_eq!(last.action, AuditAction::Delete);
    }

    #[tokio::test]
    async fn test_delete_folder_cascades_and_audits() {
        let (db, blobs, auditor) = setup().await;
        let service = LibraryService::new(db.pool(), &blobs, &auditor);
        let root = folder(&service, "Root", None).await;
        let child = folder(&service, "Child", Some(root.id)).await;
        upload(&service, Some(root.id), "a.txt").await;
        upload(&service, Some(child.id), "b.txt").await;

        let outcome = service.delete_folder(root.id, 9).await.unwrap();
        assert_eq!(outcome.folders_deleted, 2);
        assert_eq!(outcome.files_deleted, 2);
        assert!(blobs.paths().is_empty());

        let last = auditor.events().pop().unwrap();
        assert_eq!(last.actor_id, 9);
        assert_eq!(last.target, AuditTarget::Folder(root.id));
        assert_eq!(last.details["files_deleted"], 2);

        assert!(matches!(
            service.delete_folder(root.id, 9).await,
            Err(FolioError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_folder_partial_failure() {
        let (db, blobs, auditor) = setup().await;
        let service = LibraryService::new(db.pool(), &blobs, &auditor);
        let root = folder(&service, "Root", None).await;
        upload(&service, Some(root.id), "a.txt").await;
        let poison = upload(&service, Some(root.id), "poison.txt").await;
        sqlx::raw_sql(
            "CREATE TRIGGER poison_delete BEFORE DELETE ON files WHEN OLD.name = 'poison.txt'
             BEGIN SELECT RAISE(ABORT, 'simulated disk failure'); END;",
        )
        .execute(db.pool())
        .await
        .unwrap();
        let events_before = auditor.events().len();

        let err = service.delete_folder(root.id, 4).await.unwrap_err();
        match err {
            FolioError::PartialFailure(outcome) => {
                let failure = outcome.first_error.unwrap();
                assert_eq!(failure.step, CascadeStep::File(poison.id));
                assert_eq!(failure.siblings_removed, 1);
                assert_eq!(outcome.files_deleted, 1);
            }
            other => panic!("expected partial failure, got {other:?}"),
        }

        // The file that did go is still audited, together with the failure.
        let events = auditor.events();
        assert_eq!(events.len(), events_before + 1);
        let last = events.last().unwrap();
        assert_eq!(last.actor_id, 4);
        assert_eq!(last.target, AuditTarget::Folder(root.id));
        assert_eq!(last.action, AuditAction::Delete);
        assert_eq!(last.details["files_deleted"], 1);
        assert_eq!(last.details["folders_deleted"], 0);
        assert_eq!(last.details["first_error"]["step"]["kind"], "file");
        assert_eq!(last.details["first_error"]["step"]["id"], poison.id);
    }

    /// Removes the file row behind the service's back while deleting the blob,
    /// the way a concurrent delete would.
    struct RowRemovingBlobStore {
        inner: MemoryBlobStore,
        pool: DbPool,
    }

    #[async_trait]
    impl BlobStore for RowRemovingBlobStore {
        async fn put(&self, path: &str, content: &[u8], content_type: &str) -> Result<()> {
            self.inner.put(path, content, content_type).await
        }

        async fn get(&self, path: &str) -> Result<Vec<u8>> {
            self.inner.get(path).await
        }

        async fn delete(&self, path: &str) -> Result<()> {
            sqlx::query("DELETE FROM files WHERE storage_path = ?")
                .bind(path)
                .execute(&self.pool)
                .await?;
            self.inner.delete(path).await
        }

        fn url_for(&self, path: &str) -> String {
            self.inner.url_for(path)
        }
    }

    #[tokio::test]
    async fn test_delete_file_lost_race_is_not_audited() {
        let db = Database::open_in_memory().await.unwrap();
        let blobs = RowRemovingBlobStore {
            inner: MemoryBlobStore::new(),
            pool: db.pool().clone(),
        };
        let auditor = RecordingAuditor::new();
        let service = LibraryService::new(db.pool(), &blobs, &auditor);
        let file = upload(&service, None, "a.txt").await;

        service.delete_file(file.id, 1).await.unwrap();

        let events = auditor.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::Create);
        assert!(matches!(
            service.download(file.id).await,
            Err(FolioError::NotFound(_))
        ));
    }

    struct SlowBlobStore(MemoryBlobStore);

    #[async_trait]
    impl BlobStore for SlowBlobStore {
        async fn put(&self, path: &str, content: &[u8], content_type: &str) -> Result<()> {
            self.0.put(path, content, content_type).await
        }

        async fn get(&self, path: &str) -> Result<Vec<u8>> {
            self.0.get(path).await
        }

        async fn delete(&self, path: &str) -> Result<()> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            self.0.delete(path).await
        }

        fn url_for(&self, path: &str) -> String {
            self.0.url_for(path)
        }
    }

    #[tokio::test]
    async fn test_delete_folder_timeout_is_storage_error() {
        let db = Database::open_in_memory().await.unwrap();
        let blobs = SlowBlobStore(MemoryBlobStore::new());
        let auditor = RecordingAuditor::new();
        let service = LibraryService::new(db.pool(), &blobs, &auditor)
            .with_cascade_timeout(Duration::from_millis(50));

        let root = folder(&service, "Root", None).await;
        upload(&service, Some(root.id), "a.txt").await;

        let err = service.delete_folder(root.id, 1).await.unwrap_err();
        assert!(matches!(err, FolioError::Storage(_)));
        assert!(err.is_storage());
    }

    #[tokio::test]
    async fn test_list_folder() {
        let (db, blobs, auditor) = setup().await;
        let service = LibraryService::new(db.pool(), &blobs, &auditor);
        let root = folder(&service, "Root", None).await;
        let docs = folder(&service, "Docs", Some(root.id)).await;
        folder(&service, "Archive", Some(docs.id)).await;
        folder(&service, "Zeta", Some(docs.id)).await;
        upload(&service, Some(docs.id), "charlie.txt").await;
        upload(&service, Some(docs.id), "alpha.png").await;
        upload(&service, Some(docs.id), "bravo.txt").await;

        let listing = service
            .list_folder(
                Some(docs.id),
                FolderSort::default(),
                &FileListOptions::new().sort(FileSortBy::Name, SortOrder::Desc),
            )
            .await
            .unwrap();

        assert_eq!(listing.folder.as_ref().map(|f| f.id), Some(docs.id));
        assert_eq!(listing.breadcrumb(), "/Root/Docs");
        let folder_names: Vec<_> = listing.folders.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(folder_names, vec!["Archive", "Zeta"]);
        let file_names: Vec<_> = listing.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(file_names, vec!["charlie.txt", "bravo.txt", "alpha.png"]);
        assert_eq!(listing.total_size, 11 + 9 + 9);

        let texts = service
            .list_folder(
                Some(docs.id),
                FolderSort::default(),
                &FileListOptions::new().content_type("text/"),
            )
            .await
            .unwrap();
        assert_eq!(texts.files.len(), 2);

        let top = service
            .list_folder(None, FolderSort::default(), &FileListOptions::new())
            .await
            .unwrap();
        assert!(top.folder.is_none());
        assert_eq!(top.breadcrumb(), "/");
        assert_eq!(top.folders.len(), 1);
        assert!(top.files.is_empty());
    }

    #[tokio::test]
    async fn test_breadcrumbs_and_name_checks() {
        let (db, blobs, auditor) = setup().await;
        let service = LibraryService::new(db.pool(), &blobs, &auditor);
        let root = folder(&service, "Root", None).await;
        let level1 = folder(&service, "Level1", Some(root.id)).await;
        let level2 = folder(&service, "Level2", Some(level1.id)).await;
        upload(&service, Some(level2.id), "doc.pdf").await;

        let path = service.breadcrumbs(level2.id).await.unwrap();
        let names: Vec<_> = path.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Root", "Level1", "Level2"]);

        assert!(service.file_name_exists("DOC.PDF", Some(level2.id), None).await.unwrap());
        assert!(!service.file_name_exists("DOC.PDF", Some(level1.id), None).await.unwrap());
        assert!(service.folder_name_exists(" level1 ", Some(root.id), None).await.unwrap());
        assert!(!service
            .folder_name_exists("level1", Some(root.id), Some(level1.id))
            .await
            .unwrap());
    }

    #[test]
    fn test_validate_description() {
        assert_eq!(validate_description(None).unwrap(), None);
        assert_eq!(validate_description(Some("  ")).unwrap(), None);
        assert_eq!(
            validate_description(Some(" hi ")).unwrap(),
            Some("hi".to_string())
        );
        assert!(validate_description(Some(&"x".repeat(501))).is_err());
        assert!(validate_description(Some(&"x".repeat(500))).is_ok());
    }
}
