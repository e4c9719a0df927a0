//! Local document source
//!
//! Used when the external indexing source is unavailable. A directory scan
//! has no change notifications, so every scan is a full snapshot and is
//! always delivered as `ReloadAll`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use walkdir::WalkDir;

use super::filter::ExtensionFilter;
use crate::error::{BrowserError, Result};
use crate::state::document::DocumentIdentity;
use crate::state::results::ResultSet;

/// Base name given to new documents
const UNTITLED: &str = "Untitled";

/// Scan `directory` (not recursively) for documents the filter allows
pub fn enumerate(directory: &Path, filter: &ExtensionFilter) -> Result<ResultSet> {
    if !directory.is_dir() {
        return Err(BrowserError::SourceUnavailable(format!(
            "{} is not a directory",
            directory.display()
        )));
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Skipping unreadable entry in {}: {err}", directory.display());
                continue;
            }
        };

        // Only documents, not directories
        if !entry.file_type().is_file() || !filter.allows(entry.path()) {
            continue;
        }

        let last_accessed = entry
            .metadata()
            .ok()
            .and_then(|meta| meta.accessed().ok())
            .map(DateTime::<Utc>::from);

        match DocumentIdentity::from_local(entry.path().to_path_buf(), last_accessed) {
            Ok(document) => documents.push(document),
            Err(err) => warn!("Skipping {}: {err}", entry.path().display()),
        }
    }

    debug!("Enumerated {} documents in {}", documents.len(), directory.display());
    Ok(ResultSet::from_documents(documents))
}

/// First free location for a new document in `directory`.
///
/// Tries "Untitled.<ext>", then "Untitled 2.<ext>", "Untitled 3.<ext>" and so
/// on, where `<ext>` is the first allowed extension.
pub fn free_document_location(directory: &Path, filter: &ExtensionFilter) -> Result<PathBuf> {
    let extension = filter
        .default_extension()
        .ok_or_else(|| BrowserError::Config("no allowed extensions configured".to_string()))?;

    let candidate = directory.join(format!("{UNTITLED}.{extension}"));
    if !candidate.exists() {
        return Ok(candidate);
    }

    let mut counter = 2u32;
    loop {
        let candidate = directory.join(format!("{UNTITLED} {counter}.{extension}"));
        if !candidate.exists() {
            return Ok(candidate);
        }
        counter += 1;
    }
}
