//! Recently opened documents
//!
//! A capped most-recently-used list. Changes are reported with the same edit
//! vocabulary as the document list, so a consumer can animate both the same
//! way.

use crate::query::edit::{self, EditOperation};
use crate::state::document::{DocumentId, DocumentIdentity};
use crate::state::results::ResultSet;

/// Default number of recents kept
pub const DEFAULT_RECENTS_CAPACITY: usize = 8;

/// The list after a change, with the edits that produced it
#[derive(Debug, Clone)]
pub struct RecentsUpdate {
    pub list: Vec<DocumentIdentity>,
    pub edits: Vec<EditOperation>,
}

/// Most recent first, unique by identity, never longer than its capacity
#[derive(Debug, Clone)]
pub struct RecentsTracker {
    entries: Vec<DocumentIdentity>,
    capacity: usize,
}

impl RecentsTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Restore a persisted list (most recent first); duplicates and overflow are dropped
    pub fn with_entries<I>(capacity: usize, entries: I) -> Self
    where
        I: IntoIterator<Item = DocumentIdentity>,
    {
        let mut tracker = Self::new(capacity);
        for document in entries {
            if tracker.entries.len() == tracker.capacity {
                break;
            }
            if !tracker.contains(document.id()) {
                tracker.entries.push(document);
            }
        }
        tracker
    }

    /// Record that `document` was opened.
    ///
    /// A document already in the list moves to the front instead of being
    /// duplicated; when the list is full the eldest entry is evicted.
    pub fn add(&mut self, document: DocumentIdentity) -> RecentsUpdate {
        let mut edits = Vec::new();

        match self.position(document.id()) {
            Some(0) => {
                self.entries[0] = document;
                edits.push(EditOperation::Update(0));
            }
            Some(from) => {
                self.entries.remove(from);
                self.entries.insert(0, document);
                edits.push(EditOperation::Move { from, to: 0 });
                edits.push(EditOperation::Update(0));
            }
            None => {
                if self.entries.len() == self.capacity {
                    let eldest = self.entries.len() - 1;
                    self.entries.pop();
                    edits.push(EditOperation::Delete(eldest));
                }
                self.entries.insert(0, document);
                edits.push(EditOperation::Add(0));
            }
        }

        self.update(edits)
    }

    /// Forget a document (it was deleted)
    pub fn remove(&mut self, id: &DocumentId) -> Option<RecentsUpdate> {
        let index = self.position(id)?;
        self.entries.remove(index);
        Some(self.update(vec![EditOperation::Delete(index)]))
    }

    /// Pick up renames from the latest document list.
    ///
    /// Order is by recency, so a rename never moves an entry.
    pub fn refresh(&mut self, results: &ResultSet) -> Option<RecentsUpdate> {
        let mut edits = Vec::new();
        for (index, entry) in self.entries.iter_mut().enumerate() {
            if let Some(current) = results.find(entry.id()) {
                if !current.same_contents(entry) {
                    *entry = current.clone();
                    edits.push(EditOperation::Update(index));
                }
            }
        }
        (!edits.is_empty()).then(|| self.update(edits))
    }

    /// Drop entries whose file no longer exists on disk
    pub fn prune_missing(&mut self) -> Option<RecentsUpdate> {
        let mut edits = Vec::new();
        let mut index = 0;
        self.entries.retain(|entry| {
            let keep = entry.location().exists();
            if !keep {
                edits.push(EditOperation::Delete(index));
            }
            index += 1;
            keep
        });
        (!edits.is_empty()).then(|| self.update(edits))
    }

    pub fn entries(&self) -> &[DocumentIdentity] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&DocumentIdentity> {
        self.entries.get(index)
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.position(id).is_some()
    }

    pub fn position(&self, id: &DocumentId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id() == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn update(&self, edits: Vec<EditOperation>) -> RecentsUpdate {
        RecentsUpdate {
            list: self.entries.clone(),
            edits: edit::normalize(edits),
        }
    }
}
