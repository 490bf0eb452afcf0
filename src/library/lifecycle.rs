//! Cascading folder deletion.
//!
//! The repositories delete single rows unconditionally. The coordinator is
//! the policy on top: it removes everything inside a folder, depth first and
//! post-order, before the folder row itself goes. Blob cleanup is best effort;
//! a metadata failure stops the walk and is reported in the outcome together
//! with how far it got.

use std::collections::HashSet;
use std::fmt;

use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::folder::FolderRepository;
use super::listing::{FileListOptions, FolderSort};
use super::metadata::FileRepository;
use super::storage::BlobStore;
use super::MAX_TRAVERSAL_DEPTH;
use crate::db::DbPool;
use crate::fold::{NameFolder, DEFAULT_NAME_FOLDER};
use crate::{FolioError, Result};

/// The row a cascade was working on when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum CascadeStep {
    File(i64),
    Folder(i64),
}

impl fmt::Display for CascadeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CascadeStep::File(id) => write!(f, "file {id}"),
            CascadeStep::Folder(id) => write!(f, "folder {id}"),
        }
    }
}

/// The error that stopped a cascade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CascadeFailure {
    pub step: CascadeStep,
    /// Siblings of the failing row already removed at the same level.
    pub siblings_removed: usize,
    pub message: String,
}

/// What a cascade (or a folder file purge) actually did.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CascadeOutcome {
    /// Folder the operation was started on.
    pub root_id: i64,
    pub folders_deleted: usize,
    pub files_deleted: usize,
    /// Storage paths whose blob could not be deleted.
    pub files_orphaned_in_blob_store: Vec<String>,
    /// Set when the operation stopped early.
    pub first_error: Option<CascadeFailure>,
}

impl CascadeOutcome {
    pub fn new(root_id: i64) -> Self {
        Self {
            root_id,
            ..Self::default()
        }
    }

    /// Whether everything was removed (orphaned blobs do not count against it).
    pub fn is_complete(&self) -> bool {
        self.first_error.is_none()
    }

    /// Turn an aborted outcome into [`FolioError::PartialFailure`].
    pub fn into_result(self) -> Result<Self> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(FolioError::PartialFailure(Box::new(self)))
        }
    }

    fn fail(&mut self, step: CascadeStep, siblings_removed: usize, err: &FolioError) {
        if self.first_error.is_none() {
            self.first_error = Some(CascadeFailure {
                step,
                siblings_removed,
                message: err.to_string(),
            });
        }
    }
}

impl fmt::Display for CascadeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.first_error {
            None => write!(
                f,
                "folder {} removed: {} folder(s), {} file(s), {} orphaned blob(s)",
                self.root_id,
                self.folders_deleted,
                self.files_deleted,
                self.files_orphaned_in_blob_store.len()
            ),
            Some(failure) => write!(
                f,
                "cascade of folder {} stopped at {} ({} sibling(s) already removed): {}; \
                 {} folder(s) and {} file(s) removed so far",
                self.root_id,
                failure.step,
                failure.siblings_removed,
                failure.message,
                self.folders_deleted,
                self.files_deleted
            ),
        }
    }
}

/// Marker for "the walk stopped; see `outcome.first_error`".
struct Aborted;

type Step = std::result::Result<(), Aborted>;

/// Deletes folder subtrees, attempting blob cleanup for every file.
pub struct LifecycleCoordinator<'a> {
    pool: &'a DbPool,
    blobs: &'a dyn BlobStore,
    folder: &'a dyn NameFolder,
}

impl<'a> LifecycleCoordinator<'a> {
    pub fn new(pool: &'a DbPool, blobs: &'a dyn BlobStore) -> Self {
        Self {
            pool,
            blobs,
            folder: &DEFAULT_NAME_FOLDER,
        }
    }

    pub fn with_name_folder(mut self, folder: &'a dyn NameFolder) -> Self {
        self.folder = folder;
        self
    }

    fn folders(&self) -> FolderRepository<'a> {
        FolderRepository::new(self.pool).with_name_folder(self.folder)
    }

    fn files(&self) -> FileRepository<'a> {
        FileRepository::new(self.pool).with_name_folder(self.folder)
    }

    /// Delete a folder and everything transitively inside it.
    ///
    /// Fails with NotFound if the folder does not exist, so repeating a
    /// completed delete has no side effects. Any other failure is reported
    /// through `first_error` of the returned outcome; rows removed before it
    /// stay removed and re-running picks up whatever is left.
    pub async fn delete_folder(&self, id: i64) -> Result<CascadeOutcome> {
        let folders = self.folders();
        let target = folders.get(id).await?;
        info!(folder_id = id, name = %target.name, "cascading folder delete started");

        let mut outcome = CascadeOutcome::new(id);
        let mut visited = HashSet::new();

        if self
            .purge_contents(id, 0, &mut visited, &mut outcome)
            .await
            .is_ok()
        {
            match folders.delete(id).await {
                Ok(_) => outcome.folders_deleted += 1,
                Err(e) => outcome.fail(CascadeStep::Folder(id), 0, &e),
            }
        }

        match outcome.first_error {
            None => info!(
                folder_id = id,
                folders = outcome.folders_deleted,
                files = outcome.files_deleted,
                orphaned_blobs = outcome.files_orphaned_in_blob_store.len(),
                "cascading folder delete finished"
            ),
            Some(ref failure) => error!(
                folder_id = id,
                step = %failure.step,
                siblings_removed = failure.siblings_removed,
                folders = outcome.folders_deleted,
                files = outcome.files_deleted,
                error = %failure.message,
                "cascading folder delete aborted"
            ),
        }

        Ok(outcome)
    }

    /// Remove every file directly in a folder.
    ///
    /// With `cleanup_blobs` each file's blob is deleted (best effort) before
    /// its metadata, one file at a time. Without it the metadata goes in a
    /// single bulk statement and the blobs are left behind.
    pub async fn remove_folder_files(
        &self,
        folder_id: i64,
        cleanup_blobs: bool,
    ) -> Result<CascadeOutcome> {
        let mut outcome = CascadeOutcome::new(folder_id);

        if cleanup_blobs {
            let _ = self.purge_files(folder_id, &mut outcome).await;
        } else {
            let removed = self.files().delete_by_folder_id(folder_id).await?;
            outcome.files_deleted = removed as usize;
            debug!(folder_id, removed, "bulk file metadata delete, blobs kept");
        }

        Ok(outcome)
    }

    async fn purge_files(&self, folder_id: i64, outcome: &mut CascadeOutcome) -> Step {
        let files = self.files();
        let entries = match files
            .list_by_folder(Some(folder_id), &FileListOptions::default())
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                outcome.fail(CascadeStep::Folder(folder_id), 0, &e);
                return Err(Aborted);
            }
        };

        let mut removed = 0;
        for entry in entries {
            if let Err(e) = self.blobs.delete(&entry.storage_path).await {
                warn!(
                    file_id = entry.id,
                    storage_path = %entry.storage_path,
                    error = %e,
                    "blob delete failed, leaving orphan"
                );
                outcome
                    .files_orphaned_in_blob_store
                    .push(entry.storage_path.clone());
            }

            if let Err(e) = files.delete(entry.id).await {
                outcome.fail(CascadeStep::File(entry.id), removed, &e);
                return Err(Aborted);
            }
            removed += 1;
            outcome.files_deleted += 1;
        }

        Ok(())
    }

    fn purge_contents<'b>(
        &'b self,
        folder_id: i64,
        depth: usize,
        visited: &'b mut HashSet<i64>,
        outcome: &'b mut CascadeOutcome,
    ) -> BoxFuture<'b, Step> {
        async move {
            if depth >= MAX_TRAVERSAL_DEPTH {
                let err = FolioError::CorruptHierarchy(format!(
                    "folder {folder_id} is nested deeper than {MAX_TRAVERSAL_DEPTH} levels"
                ));
                outcome.fail(CascadeStep::Folder(folder_id), 0, &err);
                return Err(Aborted);
            }
            if !visited.insert(folder_id) {
                let err = FolioError::CorruptHierarchy(format!(
                    "folder {folder_id} is its own descendant"
                ));
                outcome.fail(CascadeStep::Folder(folder_id), 0, &err);
                return Err(Aborted);
            }

            self.purge_files(folder_id, outcome).await?;

            let folders = self.folders();
            let subfolders = match folders
                .list_by_parent(Some(folder_id), FolderSort::default())
                .await
            {
                Ok(subfolders) => subfolders,
                Err(e) => {
                    outcome.fail(CascadeStep::Folder(folder_id), 0, &e);
                    return Err(Aborted);
                }
            };

            let mut removed = 0;
            for sub in subfolders {
                self.purge_contents(sub.id, depth + 1, visited, outcome)
                    .await?;

                if let Err(e) = folders.delete(sub.id).await {
                    outcome.fail(CascadeStep::Folder(sub.id), removed, &e);
                    return Err(Aborted);
                }
                debug!(folder_id = sub.id, parent_id = folder_id, "subfolder removed");
                removed += 1;
                outcome.folders_deleted += 1;
            }

            Ok(())
        }
        .boxed()
    }
}
