//! Structural edits describing how one snapshot becomes the next

/// A single positional edit.
///
/// `Delete` and `Move::from` index into the *old* snapshot; `Add`, `Move::to`
/// and `Update` index into the *new* one. Consumers apply a whole batch at
/// once (removals before insertions), the same way a list view performs
/// batch updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditOperation {
    Add(usize),
    Delete(usize),
    /// `from == to` when a renamed row keeps its index but changes places with its neighbours
    Move { from: usize, to: usize },
    Update(usize),
    /// Discard positional reasoning and treat the new list as a fresh snapshot.
    /// Never appears alongside other operations.
    ReloadAll,
}

impl EditOperation {
    /// Emission group: deletes, updates, adds, moves
    fn group(&self) -> u8 {
        match self {
            EditOperation::Delete(_) => 0,
            EditOperation::Update(_) => 1,
            EditOperation::Add(_) => 2,
            EditOperation::Move { .. } => 3,
            EditOperation::ReloadAll => 4,
        }
    }

    fn sort_index(&self) -> (usize, usize) {
        match *self {
            EditOperation::Delete(i) | EditOperation::Update(i) | EditOperation::Add(i) => (i, 0),
            EditOperation::Move { from, to } => (from, to),
            EditOperation::ReloadAll => (0, 0),
        }
    }
}

/// The batch that means "start over"
pub fn reload() -> Vec<EditOperation> {
    vec![EditOperation::ReloadAll]
}

/// True when the batch asks for a full reload
pub fn is_reload(edits: &[EditOperation]) -> bool {
    edits.contains(&EditOperation::ReloadAll)
}

/// Put a batch in emission order.
///
/// A `ReloadAll` anywhere in the batch swallows everything else.
pub fn normalize(mut edits: Vec<EditOperation>) -> Vec<EditOperation> {
    if is_reload(&edits) {
        return reload();
    }
    edits.sort_by_key(|edit| (edit.group(), edit.sort_index()));
    edits.dedup();
    edits
}

#[cfg(test)]
mod tests {
    use super::*;
    use EditOperation::*;

    #[test]
    fn test_normalize_orders_groups() {
        let edits = normalize(vec![Move { from: 0, to: 3 }, Add(2), Update(4), Delete(1), Add(0)]);
        assert_eq!(edits, vec![Delete(1), Update(4), Add(0), Add(2), Move { from: 0, to: 3 }]);
    }

    #[test]
    fn test_reload_supersedes() {
        let edits = normalize(vec![Add(0), ReloadAll, Delete(3)]);
        assert_eq!(edits, vec![ReloadAll]);
        assert!(is_reload(&edits));
        assert!(!is_reload(&[Add(0)]));
    }
}
