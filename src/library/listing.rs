//! Listing options and formatting helpers.
//!
//! Sort keys, content-type filters and the small formatters used to render a
//! folder view (sizes, breadcrumbs, summaries).

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::folder::Folder;
use super::metadata::FileEntry;
use crate::FolioError;

/// Marker that switches a content-type filter from prefix mode to a
/// comma-separated list of substrings.
pub const CONTENT_TYPE_LIST_MARKER: char = '~';

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub(crate) fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = FolioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortOrder::Asc),
            "desc" | "descending" => Ok(SortOrder::Desc),
            other => Err(FolioError::Validation(format!("unknown sort order: {other}"))),
        }
    }
}

/// Sort key for folder listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderSortBy {
    #[default]
    Name,
    CreatedAt,
    UpdatedAt,
}

impl FolderSortBy {
    pub(crate) fn column(&self) -> &'static str {
        match self {
            FolderSortBy::Name => "name_fold",
            FolderSortBy::CreatedAt => "created_at",
            FolderSortBy::UpdatedAt => "updated_at",
        }
    }
}

impl FromStr for FolderSortBy {
    type Err = FolioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "name" => Ok(FolderSortBy::Name),
            "createdAt" | "created_at" => Ok(FolderSortBy::CreatedAt),
            "updatedAt" | "updated_at" => Ok(FolderSortBy::UpdatedAt),
            other => Err(FolioError::Validation(format!(
                "unknown folder sort key: {other}"
            ))),
        }
    }
}

/// Sort settings for folder listings. Defaults to name ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FolderSort {
    pub by: FolderSortBy,
    pub order: SortOrder,
}

impl FolderSort {
    pub fn new(by: FolderSortBy, order: SortOrder) -> Self {
        Self { by, order }
    }
}

/// Sort key for file listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSortBy {
    #[default]
    Name,
    CreatedAt,
    Size,
    ContentType,
}

impl FileSortBy {
    pub(crate) fn column(&self) -> &'static str {
        match self {
            FileSortBy::Name => "name_fold",
            FileSortBy::CreatedAt => "created_at",
            FileSortBy::Size => "size",
            FileSortBy::ContentType => "content_type",
        }
    }
}

impl FromStr for FileSortBy {
    type Err = FolioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "name" => Ok(FileSortBy::Name),
            "createdAt" | "created_at" => Ok(FileSortBy::CreatedAt),
            "size" => Ok(FileSortBy::Size),
            "contentType" | "content_type" => Ok(FileSortBy::ContentType),
            other => Err(FolioError::Validation(format!(
                "unknown file sort key: {other}"
            ))),
        }
    }
}

/// Content-type filter for file listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentTypeFilter {
    /// Content type starts with the given string, e.g. `image/`.
    Prefix(String),
    /// Content type contains any of the given lower-cased substrings.
    AnyOf(Vec<String>),
}

impl ContentTypeFilter {
    /// Parse a raw filter string.
    ///
    /// A plain string is a prefix match. A string starting with
    /// [`CONTENT_TYPE_LIST_MARKER`] is a comma-separated substring list, e.g.
    /// `~word,document`. Blank input (or a list with no usable entries) means
    /// no filter.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        match raw.strip_prefix(CONTENT_TYPE_LIST_MARKER) {
            Some(list) => {
                let needles: Vec<String> = list
                    .split(',')
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect();
                if needles.is_empty() {
                    None
                } else {
                    Some(ContentTypeFilter::AnyOf(needles))
                }
            }
            None => Some(ContentTypeFilter::Prefix(raw.to_string())),
        }
    }

    /// Check a content type against this filter.
    pub fn matches(&self, content_type: &str) -> bool {
        match self {
            ContentTypeFilter::Prefix(prefix) => content_type.starts_with(prefix.as_str()),
            ContentTypeFilter::AnyOf(needles) => {
                let lowered = content_type.to_lowercase();
                needles.iter().any(|n| lowered.contains(n.as_str()))
            }
        }
    }
}

/// Options for listing the files of a folder.
#[derive(Debug, Clone, Default)]
pub struct FileListOptions {
    pub sort_by: FileSortBy,
    pub order: SortOrder,
    pub content_type: Option<ContentTypeFilter>,
    /// Substring of the file name, compared on folded names.
    pub search: Option<String>,
}

impl FileListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort(mut self, sort_by: FileSortBy, order: SortOrder) -> Self {
        self.sort_by = sort_by;
        self.order = order;
        self
    }

    /// Set the content-type filter from its raw string form.
    pub fn content_type(mut self, raw: &str) -> Self {
        self.content_type = ContentTypeFilter::parse(raw);
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        let term = term.into();
        self.search = if term.trim().is_empty() {
            None
        } else {
            Some(term)
        };
        self
    }
}

/// Format a byte count for display (B, KB, MB, GB; binary units).
pub fn format_size(bytes: i64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// Render a folder path as a breadcrumb trail, root first.
pub fn format_breadcrumb(path: &[Folder], separator: &str) -> String {
    path.iter()
        .map(|f| f.name.as_str())
        .collect::<Vec<_>>()
        .join(separator)
}

/// A rendered view of one folder: its location, subfolders and files.
#[derive(Debug, Clone, Serialize)]
pub struct FolderListing {
    /// The listed folder, `None` for the library root.
    pub folder: Option<Folder>,
    /// Path from the root to the listed folder (empty for the root).
    pub path: Vec<Folder>,
    pub folders: Vec<Folder>,
    pub files: Vec<FileEntry>,
    /// Combined size of the listed files.
    pub total_size: i64,
}

impl FolderListing {
    pub fn is_empty(&self) -> bool {
        self.folders.is_empty() && self.files.is_empty()
    }

    pub fn breadcrumb(&self) -> String {
        if self.path.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", format_breadcrumb(&self.path, "/"))
        }
    }
}

impl fmt::Display for FolderListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} folder(s), {} file(s), {}",
            self.folders.len(),
            self.files.len(),
            format_size(self.total_size)
        )
    }
}
