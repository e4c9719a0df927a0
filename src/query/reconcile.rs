//! Result reconciliation
//!
//! Given the previous snapshot and one batch of changes from the document
//! source, compute the next snapshot and the edits that turn the old one into
//! the new one. Everything here is pure; the serial worker in
//! [`engine`](super::engine) owns the snapshot between batches.

use std::collections::{HashMap, HashSet};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::edit::{self, EditOperation};
use super::filter::ExtensionFilter;
use crate::error::BrowserError;
use crate::state::document::{DocumentId, DocumentIdentity, RawItem};
use crate::state::results::ResultSet;

/// How edits are reported for incremental batches.
///
/// Fixed for the lifetime of an engine so consumers can rely on the shape
/// of what they receive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiffPolicy {
    /// Deletes, updates, adds and moves
    #[default]
    FineGrained,
    /// Any effective change is reported as a single `ReloadAll`
    AlwaysReload,
}

/// One raw batch as reported by the document source
#[derive(Debug, Clone, Default)]
pub struct ChangeBatch {
    pub changed: Vec<RawItem>,
    pub removed: Vec<RawItem>,
    pub added: Vec<RawItem>,
}

impl ChangeBatch {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty() && self.added.is_empty()
    }
}

/// A batch after filtering, already resolved to identities
#[derive(Debug, Clone, Default)]
pub struct Changes {
    pub changed: Vec<DocumentIdentity>,
    pub removed: Vec<DocumentId>,
    pub added: Vec<DocumentIdentity>,
}

impl Changes {
    /// Resolve a raw batch against the allow-list.
    ///
    /// Malformed records are logged and dropped. Removals only need an
    /// identity, so they are not filtered by extension. A changed record that
    /// no longer passes the filter but is currently listed becomes a removal:
    /// the document was renamed to something the browser does not show.
    pub fn from_raw(batch: &ChangeBatch, filter: &ExtensionFilter, previous: &ResultSet) -> Self {
        let mut changes = Changes::default();

        for item in &batch.removed {
            match removal_id(item) {
                Ok(id) => changes.removed.push(id),
                Err(err) => warn!("Dropping removed record: {err}"),
            }
        }

        for item in &batch.changed {
            let Some(document) = identity_or_log(item) else {
                continue;
            };
            if filter.allows(document.location()) {
                changes.changed.push(document);
            } else if previous.contains(document.id()) {
                debug!("{} no longer matches the allow-list, removing", document.id());
                changes.removed.push(document.id().clone());
            }
        }

        for item in &batch.added {
            let Some(document) = identity_or_log(item) else {
                continue;
            };
            if filter.allows(document.location()) {
                changes.added.push(document);
            }
        }

        changes
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty() && self.added.is_empty()
    }
}

/// Output of one reconciliation pass
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub results: ResultSet,
    pub edits: Vec<EditOperation>,
}

/// Build a full snapshot from raw records; always reported as `ReloadAll`.
pub fn snapshot(items: &[RawItem], filter: &ExtensionFilter) -> Reconciliation {
    let documents = items
        .iter()
        .filter_map(identity_or_log)
        .filter(|document| filter.allows(document.location()));
    Reconciliation {
        results: dedup_into_set(documents),
        edits: edit::reload(),
    }
}

/// Reconcile `previous` with one batch of changes.
///
/// Precedence when an identity shows up in more than one set: `removed`
/// beats `changed` and `added`. An `added` identity that is already listed
/// is handled as a change, and a `changed` identity that is not listed yet
/// is handled as an addition. Removing something that is not listed is a
/// no-op.
pub fn reconcile(previous: &ResultSet, changes: Changes, policy: DiffPolicy) -> Reconciliation {
    let removed: HashSet<DocumentId> = changes.removed.into_iter().collect();

    // Later records win; changed records are applied after added ones
    let mut upserts: HashMap<DocumentId, DocumentIdentity> = HashMap::new();
    for document in changes.added.into_iter().chain(changes.changed) {
        if removed.contains(document.id()) {
            continue;
        }
        if let Some(replaced) = upserts.insert(document.id().clone(), document) {
            debug!("{}", BrowserError::DuplicateIdentity(replaced.id().to_string()));
        }
    }

    let deletions: Vec<usize> = removed
        .iter()
        .filter_map(|id| previous.index_of(id))
        .collect();

    if deletions.is_empty() && upserts.is_empty() {
        return Reconciliation {
            results: previous.clone(),
            edits: Vec::new(),
        };
    }

    let mut documents: Vec<DocumentIdentity> = previous
        .iter()
        .filter(|document| !removed.contains(document.id()) && !upserts.contains_key(document.id()))
        .cloned()
        .collect();
    let upserted_ids: Vec<DocumentId> = upserts.keys().cloned().collect();
    documents.extend(upserts.into_values());
    let results = ResultSet::from_unique(documents);

    let edits = match policy {
        DiffPolicy::AlwaysReload => edit::reload(),
        DiffPolicy::FineGrained => {
            let mut edits: Vec<EditOperation> =
                deletions.into_iter().map(EditOperation::Delete).collect();

            for id in &upserted_ids {
                let Some(to) = results.index_of(id) else {
                    continue;
                };
                match previous.index_of(id) {
                    Some(from) => {
                        // A renamed row can keep its index while swapping places with
                        // its neighbours (e.g. when a row above it is deleted); it still
                        // has to be moved or the consumer's order goes stale.
                        if from != to || sort_key_changed(previous, &results, id) {
                            edits.push(EditOperation::Move { from, to });
                        }
                        edits.push(EditOperation::Update(to));
                    }
                    None => edits.push(EditOperation::Add(to)),
                }
            }
            edit::normalize(edits)
        }
    };

    Reconciliation { results, edits }
}

fn sort_key_changed(previous: &ResultSet, results: &ResultSet, id: &DocumentId) -> bool {
    match (previous.find(id), results.find(id)) {
        (Some(old), Some(new)) => old.display_name() != new.display_name(),
        _ => false,
    }
}

fn identity_or_log(item: &RawItem) -> Option<DocumentIdentity> {
    match DocumentIdentity::from_raw(item) {
        Ok(document) => Some(document),
        Err(err) => {
            warn!("Dropping record: {err}");
            None
        }
    }
}

fn removal_id(item: &RawItem) -> Result<DocumentId, BrowserError> {
    match (&item.item_id, &item.location) {
        (Some(item_id), _) => Ok(DocumentId::Item(item_id.clone())),
        (None, Some(location)) => Ok(DocumentId::Location(location.clone())),
        (None, None) => Err(BrowserError::MalformedItem(
            "removal carries neither identity nor location".to_string(),
        )),
    }
}

fn dedup_into_set<I>(documents: I) -> ResultSet
where
    I: IntoIterator<Item = DocumentIdentity>,
{
    let mut by_id: HashMap<DocumentId, DocumentIdentity> = HashMap::new();
    for document in documents {
        if let Some(replaced) = by_id.insert(document.id().clone(), document) {
            debug!("{}", BrowserError::DuplicateIdentity(replaced.id().to_string()));
        }
    }
    ResultSet::from_unique(by_id.into_values().collect())
}
