//! Ordered, duplicate-free set of documents

use std::cmp::Ordering;
use std::collections::HashMap;

use super::document::{DocumentId, DocumentIdentity};

/// Canonical ordered list of documents.
///
/// Sorted by display name using plain `str` ordering (byte-wise, so
/// case-sensitive and locale-naive); ties fall back to the identity so the
/// order is total. No two elements share an id.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    documents: Vec<DocumentIdentity>,
    positions: HashMap<DocumentId, usize>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a sorted set from any sequence of documents.
    /// When two documents share an id the later one wins.
    pub fn from_documents<I>(documents: I) -> Self
    where
        I: IntoIterator<Item = DocumentIdentity>,
    {
        let mut by_id: HashMap<DocumentId, DocumentIdentity> = HashMap::new();
        for document in documents {
            by_id.insert(document.id().clone(), document);
        }
        Self::from_unique(by_id.into_values().collect())
    }

    pub(crate) fn from_unique(mut documents: Vec<DocumentIdentity>) -> Self {
        documents.sort_by(compare_documents);
        let positions = documents
            .iter()
            .enumerate()
            .map(|(index, document)| (document.id().clone(), index))
            .collect();
        Self {
            documents,
            positions,
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&DocumentIdentity> {
        self.documents.get(index)
    }

    /// Position of `id` in this snapshot
    pub fn index_of(&self, id: &DocumentId) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.positions.contains_key(id)
    }

    /// Look a document up by identity
    pub fn find(&self, id: &DocumentId) -> Option<&DocumentIdentity> {
        self.index_of(id).and_then(|index| self.documents.get(index))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DocumentIdentity> {
        self.documents.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &DocumentId> {
        self.documents.iter().map(DocumentIdentity::id)
    }

    pub fn as_slice(&self) -> &[DocumentIdentity] {
        &self.documents
    }
}

/// Two snapshots are equal when they list the same documents, field for field, in the same order
impl PartialEq for ResultSet {
    fn eq(&self, other: &Self) -> bool {
        self.documents.len() == other.documents.len()
            && self
                .documents
                .iter()
                .zip(&other.documents)
                .all(|(a, b)| a.same_contents(b))
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a DocumentIdentity;
    type IntoIter = std::slice::Iter<'a, DocumentIdentity>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.iter()
    }
}

fn compare_documents(a: &DocumentIdentity, b: &DocumentIdentity) -> Ordering {
    a.display_name()
        .cmp(b.display_name())
        .then_with(|| a.id().cmp(b.id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::document::RawItem;

    fn doc(path: &str, item_id: &str) -> DocumentIdentity {
        DocumentIdentity::from_raw(&RawItem::new(path).with_item_id(item_id)).unwrap()
    }

    #[test]
    fn test_sorted_by_display_name() {
        let set = ResultSet::from_documents(vec![
            doc("/d/pear.rtf", "1"),
            doc("/d/Apple.rtf", "2"),
            doc("/d/apple.rtf", "3"),
        ]);
        let names: Vec<_> = set.iter().map(|d| d.display_name()).collect();
        // Byte-wise: uppercase sorts before lowercase
        assert_eq!(names, vec!["Apple", "apple", "pear"]);
    }

    #[test]
    fn test_later_duplicate_wins() {
        let set = ResultSet::from_documents(vec![doc("/d/a.rtf", "1"), doc("/d/b.rtf", "1")]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(0).unwrap().display_name(), "b");
    }

    #[test]
    fn test_index_lookup() {
        let set = ResultSet::from_documents(vec![doc("/d/b.rtf", "b"), doc("/d/a.rtf", "a")]);
        let b = DocumentId::Item("b".to_string());
        assert_eq!(set.index_of(&b), Some(1));
        assert!(set.contains(&b));
        assert_eq!(set.find(&b).unwrap().display_name(), "b");
        assert_eq!(set.index_of(&DocumentId::Item("zz".to_string())), None);
    }

    #[test]
    fn test_ties_broken_by_id() {
        let first = ResultSet::from_documents(vec![doc("/x/same.rtf", "2"), doc("/y/same.rtf", "1")]);
        let second = ResultSet::from_documents(vec![doc("/y/same.rtf", "1"), doc("/x/same.rtf", "2")]);
        assert_eq!(first, second);
        assert_eq!(first.get(0).unwrap().id(), &DocumentId::Item("1".to_string()));
    }
}
