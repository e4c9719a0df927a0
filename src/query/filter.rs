//! Extension allow-list applied to every batch before reconciliation

use std::path::Path;
use std::sync::Arc;

/// Supplies the file extensions the browser shows.
///
/// Consulted once per batch. The first entry is the extension given to newly
/// created documents.
pub trait AllowList: Send + Sync {
    fn allowed_extensions(&self) -> Vec<String>;
}

impl AllowList for Vec<String> {
    fn allowed_extensions(&self) -> Vec<String> {
        self.clone()
    }
}

impl<T: AllowList + ?Sized> AllowList for Arc<T> {
    fn allowed_extensions(&self) -> Vec<String> {
        (**self).allowed_extensions()
    }
}

/// Snapshot of an allow-list taken for a single batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionFilter {
    extensions: Vec<String>,
}

impl ExtensionFilter {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
        }
    }

    pub fn from_allow_list(list: &dyn AllowList) -> Self {
        Self::new(list.allowed_extensions())
    }

    /// Extension comparison is ASCII case-insensitive; files without an extension never pass
    pub fn allows(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }

    /// Extension for newly created documents
    pub fn default_extension(&self) -> Option<&str> {
        self.extensions.first().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_listed_extensions_only() {
        let filter = ExtensionFilter::new(["rtf"]);
        assert!(filter.allows(Path::new("/d/a.rtf")));
        assert!(filter.allows(Path::new("/d/A.RTF")));
        assert!(!filter.allows(Path::new("/d/a.txt")));
        assert!(!filter.allows(Path::new("/d/rtf")));
    }

    #[test]
    fn test_default_extension_is_first() {
        let list: Vec<String> = vec![".rtfd".to_string(), "rtf".to_string()];
        let filter = ExtensionFilter::from_allow_list(&list);
        assert_eq!(filter.default_extension(), Some("rtfd"));
        assert!(ExtensionFilter::new(Vec::<String>::new()).default_extension().is_none());
    }
}
