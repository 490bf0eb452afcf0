//! Nested folder/file library.
//!
//! This module provides:
//! - Folder hierarchy with name-folded uniqueness per parent
//! - File metadata catalog
//! - Pluggable blob storage and audit sinks
//! - Cascading folder deletion with an explicit outcome record
//! - A service layer with input validation

mod audit;
mod folder;
mod lifecycle;
mod listing;
mod metadata;
mod service;
mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use audit::{AuditAction, AuditEvent, AuditTarget, Auditor, NoopAuditor, TracingAuditor};
pub use folder::{Folder, FolderRepository, FolderUpdate, NewFolder};
pub use lifecycle::{CascadeFailure, CascadeOutcome, CascadeStep, LifecycleCoordinator};
pub use listing::{
    format_breadcrumb, format_size, ContentTypeFilter, FileListOptions, FileSortBy, FolderListing,
    FolderSort, FolderSortBy, SortOrder, CONTENT_TYPE_LIST_MARKER,
};
pub use metadata::{FileEntry, FileRepository, FileUpdate, NewFile};
pub use service::{CreateFolderRequest, Download, LibraryService, UploadRequest};
pub use storage::{generate_storage_path, BlobStore, FsBlobStore};

/// Maximum length for folder and file names (in characters).
pub const MAX_NAME_LENGTH: usize = 100;

/// Maximum length for file/folder description (in characters).
pub const MAX_DESCRIPTION_LENGTH: usize = 500;

/// Default maximum folder depth (levels) enforced on creation.
pub const MAX_FOLDER_DEPTH: usize = 10;

/// Hard bound on any walk over the parent graph.
pub const MAX_TRAVERSAL_DEPTH: usize = 64;

/// Default maximum file size (10MB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
