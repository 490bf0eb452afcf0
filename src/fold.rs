//! Name folding.
//!
//! A folded name is the comparison key used for per-folder uniqueness, the
//! default sort order and name search. The same [`NameFolder`] must be used
//! when a name is stored and when a query is built, or lookups silently miss.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Produces a case- and diacritic-insensitive comparison key.
pub trait NameFolder: Send + Sync {
    /// Fold a string into its comparison key. Must be pure.
    fn normalize(&self, s: &str) -> String;
}

/// Default folding: canonical decomposition, combining marks dropped,
/// lower-cased, surrounding whitespace trimmed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNameFolder;

impl NameFolder for DefaultNameFolder {
    fn normalize(&self, s: &str) -> String {
        s.trim()
            .nfd()
            .filter(|c| !is_combining_mark(*c))
            .flat_map(char::to_lowercase)
            .collect()
    }
}

/// Shared instance for repositories built without an explicit folder.
pub static DEFAULT_NAME_FOLDER: DefaultNameFolder = DefaultNameFolder;
