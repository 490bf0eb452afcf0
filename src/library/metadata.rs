//! File metadata types and repository for the library.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::QueryBuilder;
use tracing::debug;

use super::listing::{ContentTypeFilter, FileListOptions};
use crate::db::{map_write_error, DbPool};
use crate::fold::{NameFolder, DEFAULT_NAME_FOLDER};
use crate::{FolioError, Result};

const FILE_COLUMNS: &str = "id, folder_id, name, name_fold, storage_path, size, content_type, description, created_at, updated_at, created_by_id";

/// Metadata for a file in the library.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct FileEntry {
    /// Unique file ID.
    pub id: i64,
    /// Folder this file belongs to (None for root-level files).
    pub folder_id: Option<i64>,
    /// Display name.
    pub name: String,
    /// Folded name used for comparison, search and default sort.
    pub name_fold: String,
    /// Opaque key of the content in the blob store.
    pub storage_path: String,
    /// File size in bytes.
    pub size: i64,
    /// MIME content type.
    pub content_type: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// User ID of the uploader.
    pub created_by_id: i64,
}

/// Data for creating a new file entry.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub folder_id: Option<i64>,
    pub name: String,
    pub storage_path: String,
    pub size: i64,
    pub content_type: String,
    pub description: Option<String>,
    pub created_by_id: i64,
}

impl NewFile {
    /// Create a new NewFile.
    pub fn new(
        folder_id: Option<i64>,
        name: impl Into<String>,
        storage_path: impl Into<String>,
        size: i64,
        content_type: impl Into<String>,
        created_by_id: i64,
    ) -> Self {
        Self {
            folder_id,
            name: name.into(),
            storage_path: storage_path.into(),
            size,
            content_type: content_type.into(),
            description: None,
            created_by_id,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Partial update of file metadata. Size and content type are fixed at
/// creation and cannot be changed.
#[derive(Debug, Clone, Default)]
pub struct FileUpdate {
    pub name: Option<String>,
    /// New description (`Some(None)` clears it).
    pub description: Option<Option<String>>,
}

impl FileUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the description.
    pub fn description(mut self, description: Option<impl Into<String>>) -> Self {
        self.description = Some(description.map(|s| s.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

/// Repository for file metadata operations. Never touches blob content.
pub struct FileRepository<'a> {
    pool: &'a DbPool,
    folder: &'a dyn NameFolder,
}

impl<'a> FileRepository<'a> {
    /// Create a new FileRepository using the default name folding.
    pub fn new(pool: &'a DbPool) -> Self {
        Self {
            pool,
            folder: &DEFAULT_NAME_FOLDER,
        }
    }

    /// Use a specific name folder.
    pub fn with_name_folder(mut self, folder: &'a dyn NameFolder) -> Self {
        self.folder = folder;
        self
    }

    /// Create a new file entry.
    ///
    /// An insert that loses a race on the folded name (or reuses a storage
    /// path) fails with [`FolioError::Conflict`].
    pub async fn create(&self, file: &NewFile) -> Result<FileEntry> {
        let now = Utc::now();

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO files (folder_id, name, name_fold, storage_path, size, content_type, description, created_at, updated_at, created_by_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(file.folder_id)
        .bind(&file.name)
        .bind(self.folder.normalize(&file.name))
        .bind(&file.storage_path)
        .bind(file.size)
        .bind(&file.content_type)
        .bind(&file.description)
        .bind(now)
        .bind(now)
        .bind(file.created_by_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| {
            map_write_error(e, || {
                format!("a file named '{}' already exists here", file.name)
            })
        })?;

        debug!(file_id = id, folder_id = ?file.folder_id, "file entry created");
        self.get(id).await
    }

    /// Get a file by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<FileEntry>> {
        let query = format!("SELECT {FILE_COLUMNS} FROM files WHERE id = ?");
        let file = sqlx::query_as::<_, FileEntry>(&query)
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| FolioError::Database(e.to_string()))?;

        Ok(file)
    }

    /// Get a file by ID, failing with NotFound if it does not exist.
    pub async fn get(&self, id: i64) -> Result<FileEntry> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| FolioError::NotFound(format!("file {id}")))
    }

    /// Get a file by its blob storage path.
    pub async fn get_by_storage_path(&self, storage_path: &str) -> Result<Option<FileEntry>> {
        let query = format!("SELECT {FILE_COLUMNS} FROM files WHERE storage_path = ?");
        let file = sqlx::query_as::<_, FileEntry>(&query)
            .bind(storage_path)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| FolioError::Database(e.to_string()))?;

        Ok(file)
    }

    /// List the files directly in a folder (`None` for root-level files),
    /// filtered and sorted per `options`.
    pub async fn list_by_folder(
        &self,
        folder_id: Option<i64>,
        options: &FileListOptions,
    ) -> Result<Vec<FileEntry>> {
        let mut query: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE folder_id IS "
        ));
        query.push_bind(folder_id);

        match &options.content_type {
            Some(ContentTypeFilter::Prefix(prefix)) => {
                query.push(" AND substr(content_type, 1, length(");
                query.push_bind(prefix.clone());
                query.push(")) = ");
                query.push_bind(prefix.clone());
            }
            Some(ContentTypeFilter::AnyOf(needles)) => {
                query.push(" AND (");
                {
                    let mut any = query.separated(" OR ");
                    for needle in needles {
                        any.push("instr(lower(content_type), ");
                        any.push_bind_unseparated(needle.clone());
                        any.push_unseparated(") > 0");
                    }
                }
                query.push(")");
            }
            None => {}
        }

        if let Some(ref term) = options.search {
            let folded = self.folder.normalize(term);
            if !folded.is_empty() {
                query.push(" AND instr(name_fold, ");
                query.push_bind(folded);
                query.push(") > 0");
            }
        }

        let direction = options.order.as_sql();
        query.push(format!(
            " ORDER BY {} {direction}, id {direction}",
            options.sort_by.column()
        ));

        let files = query
            .build_query_as::<FileEntry>()
            .fetch_all(self.pool)
            .await
            .map_err(|e| FolioError::Database(e.to_string()))?;

        Ok(files)
    }

    /// Update a file's name and/or description.
    pub async fn update(&self, id: i64, update: &FileUpdate) -> Result<FileEntry> {
        if update.is_empty() {
            return self.get(id).await;
        }

        let mut query: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new("UPDATE files SET ");
        let mut separated = query.separated(", ");

        if let Some(ref name) = update.name {
            separated.push("name = ");
            separated.push_bind_unseparated(name.clone());
            separated.push("name_fold = ");
            separated.push_bind_unseparated(self.folder.normalize(name));
        }

        if let Some(ref description) = update.description {
            separated.push("description = ");
            separated.push_bind_unseparated(description.clone());
        }

        separated.push("updated_at = ");
        separated.push_bind_unseparated(Utc::now());

        query.push(" WHERE id = ");
        query.push_bind(id);

        let result = query.build().execute(self.pool).await.map_err(|e| {
            map_write_error(e, || {
                format!(
                    "a file named '{}' already exists here",
                    update.name.as_deref().unwrap_or_default()
                )
            })
        })?;

        if result.rows_affected() == 0 {
            return Err(FolioError::NotFound(format!("file {id}")));
        }

        self.get(id).await
    }

    /// Delete a file entry. The blob is left alone.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| FolioError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete every file entry in a folder in one statement.
    ///
    /// No blob cleanup happens here; the blobs of the removed entries are
    /// orphaned. Use the lifecycle coordinator when they must go too.
    pub async fn delete_by_folder_id(&self, folder_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM files WHERE folder_id = ?")
            .bind(folder_id)
            .execute(self.pool)
            .await
            .map_err(|e| FolioError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    /// Count files in a folder.
    pub async fn count_by_folder(&self, folder_id: Option<i64>) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM files WHERE folder_id IS ?")
            .bind(folder_id)
            .fetch_one(self.pool)
            .await
            .map_err(|e| FolioError::Database(e.to_string()))?;

        Ok(count.0)
    }

    /// Get total size of files in a folder.
    pub async fn total_size_by_folder(&self, folder_id: Option<i64>) -> Result<i64> {
        let size: (i64,) =
            sqlx::query_as("SELECT COALESCE(SUM(size), 0) FROM files WHERE folder_id IS ?")
                .bind(folder_id)
                .fetch_one(self.pool)
                .await
                .map_err(|e| FolioError::Database(e.to_string()))?;

        Ok(size.0)
    }

    /// Check whether a file with the same folded name exists in a folder.
    pub async fn name_exists_in_folder(
        &self,
        name: &str,
        folder_id: Option<i64>,
        exclude_id: Option<i64>,
    ) -> Result<bool> {
        let exists: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM files
                           WHERE folder_id IS ? AND name_fold = ? AND id IS NOT ?)",
        )
        .bind(folder_id)
        .bind(self.folder.normalize(name))
        .bind(exclude_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| FolioError::Database(e.to_string()))?;

        Ok(exists.0)
    }
}
