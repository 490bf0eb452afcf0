//! Folio - nested folder/file library
//!
//! Virtual folder hierarchy and file catalog over SQLite, with pluggable blob
//! storage and cascading folder deletion.

pub mod config;
pub mod db;
pub mod error;
pub mod fold;
pub mod library;
pub mod logging;

pub use config::Config;
pub use db::{Database, DbPool};
pub use error::{FolioError, Result};
pub use fold::{DefaultNameFolder, NameFolder};
pub use library::{
    AuditAction, AuditEvent, AuditTarget, Auditor, BlobStore, CascadeFailure, CascadeOutcome,
    CascadeStep, ContentTypeFilter, CreateFolderRequest, Download, FileEntry, FileListOptions,
    FileRepository, FileSortBy, FileUpdate, Folder, FolderListing, FolderRepository, FolderSort,
    FolderSortBy, FolderUpdate, FsBlobStore, LibraryService, LifecycleCoordinator, NewFile,
    NewFolder, NoopAuditor, SortOrder, TracingAuditor, UploadRequest,
};
