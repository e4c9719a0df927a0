/// State management module
///
/// This module holds the browser's data model and everything it keeps
/// between runs:
/// - Document identities and the sorted result list (document.rs, results.rs)
/// - The recently opened documents (recents.rs)
/// - The SQLite catalog and the preferences stored in it (catalog.rs, preferences.rs)

pub mod catalog;
pub mod document;
pub mod preferences;
pub mod recents;
pub mod results;
