//! Document identity model
//!
//! These structs represent the data model that flows between the
//! document source, the reconciliation engine and the browser.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BrowserError, Result};

/// Stable identity of a document
///
/// Survives renames and moves when the source supplies a persistent item
/// identity. Documents without one (plain local files) are keyed by location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DocumentId {
    /// Persistent identity assigned by the external source
    Item(String),
    /// Fallback identity: the location the document was found at
    Location(PathBuf),
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentId::Item(id) => write!(f, "item:{id}"),
            DocumentId::Location(path) => write!(f, "file:{}", path.display()),
        }
    }
}

/// A raw record as delivered by the external metadata source
///
/// Every field is optional on the wire; [`DocumentIdentity::from_raw`]
/// decides what is required.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawItem {
    /// Persistent item identity, when the source has one
    pub item_id: Option<String>,
    /// Current location of the item
    pub location: Option<PathBuf>,
    /// True when the item lives in another app's container
    pub is_external: bool,
    /// Display name of the foreign container
    pub container_name: Option<String>,
    /// Last time the document content was accessed
    pub last_accessed: Option<DateTime<Utc>>,
}

impl RawItem {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: Some(location.into()),
            ..Self::default()
        }
    }

    pub fn with_item_id(mut self, item_id: impl Into<String>) -> Self {
        self.item_id = Some(item_id.into());
        self
    }

    pub fn external(mut self, container_name: impl Into<String>) -> Self {
        self.is_external = true;
        self.container_name = Some(container_name.into());
        self
    }

    pub fn accessed_at(mut self, when: DateTime<Utc>) -> Self {
        self.last_accessed = Some(when);
        self
    }
}

/// Immutable value representing one discoverable document.
///
/// Equality and hashing only look at [`id`](Self::id), so two values taken
/// before and after a rename compare equal even though their locations and
/// display names differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentIdentity {
    id: DocumentId,
    location: PathBuf,
    display_name: String,
    subtitle: String,
    last_accessed: Option<DateTime<Utc>>,
}

impl DocumentIdentity {
    /// Build an identity from a source record.
    ///
    /// The display name is taken from the location (file name without its
    /// extension) rather than from any name the source reports, so it stays
    /// in step with renames.
    pub fn from_raw(item: &RawItem) -> Result<Self> {
        let location = item
            .location
            .clone()
            .ok_or_else(|| BrowserError::MalformedItem("record has no location".to_string()))?;
        let display_name = display_name_for(&location)?;

        let id = match &item.item_id {
            Some(item_id) => DocumentId::Item(item_id.clone()),
            None => DocumentId::Location(location.clone()),
        };

        // Foreign documents are decorated with the container they come from
        let subtitle = match (&item.container_name, item.is_external) {
            (Some(container), true) => format!("in {container}"),
            _ => String::new(),
        };

        Ok(Self {
            id,
            location,
            display_name,
            subtitle,
            last_accessed: item.last_accessed,
        })
    }

    /// Build an identity for a file found by local enumeration
    pub fn from_local(location: PathBuf, last_accessed: Option<DateTime<Utc>>) -> Result<Self> {
        let display_name = display_name_for(&location)?;
        Ok(Self {
            id: DocumentId::Location(location.clone()),
            location,
            display_name,
            subtitle: String::new(),
            last_accessed,
        })
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn subtitle(&self) -> &str {
        &self.subtitle
    }

    pub fn last_accessed(&self) -> Option<DateTime<Utc>> {
        self.last_accessed
    }

    /// File extension of the current location, if any
    pub fn extension(&self) -> Option<&str> {
        self.location.extension().and_then(|ext| ext.to_str())
    }

    /// Short date for the last access (e.g. "06/14/15"), empty when unknown
    pub fn last_accessed_label(&self) -> String {
        self.last_accessed
            .map(|when| when.format("%m/%d/%y").to_string())
            .unwrap_or_default()
    }

    /// True if every field, not just the identity, matches `other`
    pub fn same_contents(&self, other: &Self) -> bool {
        self.id == other.id
            && self.location == other.location
            && self.display_name == other.display_name
            && self.subtitle == other.subtitle
            && self.last_accessed == other.last_accessed
    }
}

impl PartialEq for DocumentIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DocumentIdentity {}

impl Hash for DocumentIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

fn display_name_for(location: &Path) -> Result<String> {
    location
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            BrowserError::MalformedItem(format!("no file name in {}", location.display()))
        })
}
