//! Folder types and repository for the library.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::QueryBuilder;
use tracing::debug;

use super::listing::FolderSort;
use super::MAX_TRAVERSAL_DEPTH;
use crate::db::{map_write_error, DbPool};
use crate::fold::{NameFolder, DEFAULT_NAME_FOLDER};
use crate::{FolioError, Result};

/// A folder in the library.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Folder {
    /// Unique folder ID.
    pub id: i64,
    /// Folder name as entered.
    pub name: String,
    /// Folded name used for comparison and default sort.
    pub name_fold: String,
    /// Parent folder ID (None for root folders).
    pub parent_id: Option<i64>,
    /// Folder description.
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// User ID of the creator.
    pub created_by_id: i64,
}

impl Folder {
    /// Whether this folder sits at the library root.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Data for creating a new folder.
#[derive(Debug, Clone)]
pub struct NewFolder {
    pub name: String,
    pub description: Option<String>,
    /// Parent folder ID (None for root folders).
    pub parent_id: Option<i64>,
    pub created_by_id: i64,
}

impl NewFolder {
    /// Create a new root-level NewFolder.
    pub fn new(name: impl Into<String>, created_by_id: i64) -> Self {
        Self {
            name: name.into(),
            description: None,
            parent_id: None,
            created_by_id,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the parent folder.
    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Set or clear the parent folder.
    pub fn in_parent(mut self, parent_id: Option<i64>) -> Self {
        self.parent_id = parent_id;
        self
    }
}

/// Partial update of a folder. Omitted fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct FolderUpdate {
    /// New folder name.
    pub name: Option<String>,
    /// New description (`Some(None)` clears it).
    pub description: Option<Option<String>>,
}

impl FolderUpdate {
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

    /// Check if any fields are set.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

/// Repository for folder operations.
///
/// Deletion here is mechanism only: a row is removed regardless of whether
/// anything still points at it.
pub struct FolderRepository<'a> {
    pool: &'a DbPool,
    folder: &'a dyn NameFolder,
}

impl<'a> FolderRepository<'a> {
    /// Create a new FolderRepository using the default name folding.
    pub fn new(pool: &'a DbPool) -> Self {
        Self {
            pool,
            folder: &DEFAULT_NAME_FOLDER,
        }
    }

    /// Use a specific name folder. It must match the one used by every other
    /// writer of the same database.
    pub fn with_name_folder(mut self, folder: &'a dyn NameFolder) -> Self {
        self.folder = folder;
        self
    }

    /// Create a new folder.
    ///
    /// Callers are expected to have checked [`Self::name_exists_in_parent`]
    /// first; a concurrent insert that wins the race makes this return
    /// [`FolioError::Conflict`].
    pub async fn create(&self, folder: &NewFolder) -> Result<Folder> {
        let now = Utc::now();
        let name_fold = self.folder.normalize(&folder.name);

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO folders (name, name_fold, parent_id, description, created_at, updated_at, created_by_id)
             VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&folder.name)
        .bind(&name_fold)
        .bind(folder.parent_id)
        .bind(&folder.description)
        .bind(now)
        .bind(now)
        .bind(folder.created_by_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| {
            map_write_error(e, || {
                format!("a folder named '{}' already exists here", folder.name)
            })
        })?;

        debug!(folder_id = id, parent_id = ?folder.parent_id, "folder created");
        self.get(id).await
    }

    /// Get a folder by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Folder>> {
        let folder = sqlx::query_as::<_, Folder>(
            "SELECT id, name, name_fold, parent_id, description, created_at, updated_at, created_by_id
             FROM folders WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| FolioError::Database(e.to_string()))?;

        Ok(folder)
    }

    /// Get a folder by ID, failing with NotFound if it does not exist.
    pub async fn get(&self, id: i64) -> Result<Folder> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| FolioError::NotFound(format!("folder {id}")))
    }

    /// List the folders directly under a parent (`None` for the root).
    pub async fn list_by_parent(
        &self,
        parent_id: Option<i64>,
        sort: FolderSort,
    ) -> Result<Vec<Folder>> {
        let direction = sort.order.as_sql();
        let query = format!(
            "SELECT id, name, name_fold, parent_id, description, created_at, updated_at, created_by_id
             FROM folders WHERE parent_id IS ? ORDER BY {} {direction}, id {direction}",
            sort.by.column()
        );

        let folders = sqlx::query_as::<_, Folder>(&query)
            .bind(parent_id)
            .fetch_all(self.pool)
            .await
            .map_err(|e| FolioError::Database(e.to_string()))?;

        Ok(folders)
    }

    /// Count the folders directly under a parent.
    pub async fn count_by_parent(&self, parent_id: Option<i64>) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM folders WHERE parent_id IS ?")
            .bind(parent_id)
            .fetch_one(self.pool)
            .await
            .map_err(|e| FolioError::Database(e.to_string()))?;

        Ok(count.0)
    }

    /// Check whether a folder with the same folded name exists under a parent.
    ///
    /// `exclude_id` skips one folder, so a rename does not collide with itself.
    pub async fn name_exists_in_parent(
        &self,
        name: &str,
        parent_id: Option<i64>,
        exclude_id: Option<i64>,
    ) -> Result<bool> {
        let exists: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM folders
                           WHERE parent_id IS ? AND name_fold = ? AND id IS NOT ?)",
        )
        .bind(parent_id)
        .bind(self.folder.normalize(name))
        .bind(exclude_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| FolioError::Database(e.to_string()))?;

        Ok(exists.0)
    }

    /// Whether a folder has at least one direct subfolder.
    pub async fn has_subfolders(&self, id: i64) -> Result<bool> {
        let exists: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM folders WHERE parent_id = ?)")
                .bind(id)
                .fetch_one(self.pool)
                .await
                .map_err(|e| FolioError::Database(e.to_string()))?;

        Ok(exists.0)
    }

    /// Update a folder's name and/or description.
    pub async fn update(&self, id: i64, update: &FolderUpdate) -> Result<Folder> {
        if update.is_empty() {
            return self.get(id).await;
        }

        let mut query: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new("UPDATE folders SET ");
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
                    "a folder named '{}' already exists here",
                    update.name.as_deref().unwrap_or_default()
                )
            })
        })?;

        if result.rows_affected() == 0 {
            return Err(FolioError::NotFound(format!("folder {id}")));
        }

        self.get(id).await
    }

    /// Delete a folder row. Does not look at or remove its contents.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM folders WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| FolioError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Get the ancestors of a folder, root first, excluding the folder itself.
    ///
    /// One lookup per hop. A parent pointer to a missing row surfaces as
    /// NotFound. A chain longer than [`MAX_TRAVERSAL_DEPTH`] or one that loops
    /// back on itself fails with [`FolioError::CorruptHierarchy`].
    pub async fn get_ancestors(&self, id: i64) -> Result<Vec<Folder>> {
        let (_, ancestors) = self.walk_up(id).await?;
        Ok(ancestors)
    }

    /// Get the path from the root to a folder, inclusive.
    pub async fn get_path(&self, id: i64) -> Result<Vec<Folder>> {
        let (folder, mut path) = self.walk_up(id).await?;
        path.push(folder);
        Ok(path)
    }

    /// Get the depth of a folder (0 for root folders).
    pub async fn get_depth(&self, id: i64) -> Result<usize> {
        Ok(self.get_ancestors(id).await?.len())
    }

    async fn walk_up(&self, id: i64) -> Result<(Folder, Vec<Folder>)> {
        let folder = self.get(id).await?;
        let mut seen = HashSet::from([folder.id]);
        let mut ancestors = Vec::new();
        let mut next = folder.parent_id;

        while let Some(parent_id) = next {
            if ancestors.len() >= MAX_TRAVERSAL_DEPTH {
                return Err(FolioError::CorruptHierarchy(format!(
                    "folder {id} is nested deeper than {MAX_TRAVERSAL_DEPTH} levels"
                )));
            }
            if !seen.insert(parent_id) {
                return Err(FolioError::CorruptHierarchy(format!(
                    "parent chain of folder {id} loops back to folder {parent_id}"
                )));
            }

            let parent = self.get(parent_id).await?;
            next = parent.parent_id;
            ancestors.push(parent);
        }

        ancestors.reverse();
        Ok((folder, ancestors))
    }
}
