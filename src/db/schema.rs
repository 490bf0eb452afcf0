//! Database schema and migrations for Folio.
//!
//! Migrations are applied sequentially when the database is first opened or
//! upgraded. The schema_version table tracks which ones have run.
//!
//! Parent references are deliberately plain columns without foreign keys:
//! deleting a folder row never checks or cascades to its children. Removing
//! a subtree is the job of the lifecycle coordinator.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: Folders
    r#"
CREATE TABLE folders (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL,
    name_fold       TEXT NOT NULL,
    parent_id       INTEGER,                 -- NULL for root folders
    description     TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    created_by_id   INTEGER NOT NULL
);

-- Root folders share the pseudo parent 0 so that NULLs still collide
CREATE UNIQUE INDEX idx_folders_parent_name ON folders(IFNULL(parent_id, 0), name_fold);
CREATE INDEX idx_folders_parent_id ON folders(parent_id);
"#,
    // v2: Files
    r#"
CREATE TABLE files (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    folder_id       INTEGER,                 -- NULL for root-level files
    name            TEXT NOT NULL,
    name_fold       TEXT NOT NULL,
    storage_path    TEXT NOT NULL,
    size            INTEGER NOT NULL,
    content_type    TEXT NOT NULL,
    description     TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    created_by_id   INTEGER NOT NULL
);

CREATE UNIQUE INDEX idx_files_folder_name ON files(IFNULL(folder_id, 0), name_fold);
CREATE UNIQUE INDEX idx_files_storage_path ON files(storage_path);
CREATE INDEX idx_files_folder_id ON files(folder_id);
"#,
];
