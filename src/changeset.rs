/// Row deltas - change propagation from a Table to its Views
///
/// Every successful `Table` mutation returns a `RowDelta` describing exactly
/// which physical row offsets were touched. Views use it to decide what to
/// recompute: removed offsets are unlinked and the survivors renumbered,
/// inserted and updated offsets are re-keyed, and a clear forces a key-cache
/// rebuild.
///
/// # Change Types
///
/// - `RowInserted`: a new row was appended at an offset
/// - `RowUpdated`: supplied fields of an existing row were overwritten
/// - `RowsRemoved`: rows were removed; offsets are pre-removal
/// - `Cleared`: every row was dropped

use std::collections::BTreeSet;

/// A single change to a table
#[derive(Debug, Clone, PartialEq)]
pub enum TableChange {
    RowInserted { index: usize },

    RowUpdated { index: usize, columns: Vec<String> },

    /// Sorted ascending, offsets as they were before the removal
    RowsRemoved { indices: Vec<usize> },

    Cleared,
}

/// The changes produced by one table mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowDelta {
    changes: Vec<TableChange>,
    /// Table generation after the mutation
    generation: u64,
}

impl RowDelta {
    pub fn new(generation: u64) -> Self {
        RowDelta {
            changes: Vec::new(),
            generation,
        }
    }

    pub fn push(&mut self, change: TableChange) {
        self.changes.push(change);
    }

    pub fn changes(&self) -> &[TableChange] {
        &self.changes
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Post-mutation offsets of inserted and updated rows.
    pub fn touched_rows(&self) -> BTreeSet<usize> {
        self.changes
            .iter()
            .filter_map(|change| match change {
                TableChange::RowInserted { index } | TableChange::RowUpdated { index, .. } => {
                    Some(*index)
                }
                _ => None,
            })
            .collect()
    }

    pub fn inserted_count(&self) -> usize {
        self.changes
            .iter()
            .filter(|c| matches!(c, TableChange::RowInserted { .. }))
            .count()
    }

    pub fn updated_count(&self) -> usize {
        self.changes
            .iter()
            .filter(|c| matches!(c, TableChange::RowUpdated { .. }))
            .count()
    }

    pub fn removed_count(&self) -> usize {
        self.changes
            .iter()
            .map(|c| match c {
                TableChange::RowsRemoved { indices } => indices.len(),
                _ => 0,
            })
            .sum()
    }

    /// True if every row was dropped at some point in this mutation.
    pub fn is_reset(&self) -> bool {
        self.changes.iter().any(|c| matches!(c, TableChange::Cleared))
    }

    /// Pre-removal offsets of removed rows, sorted ascending.
    pub fn removed_rows(&self) -> Vec<usize> {
        let removed: BTreeSet<usize> = self
            .changes
            .iter()
            .filter_map(|change| match change {
                TableChange::RowsRemoved { indices } => Some(indices),
                _ => None,
            })
            .flatten()
            .copied()
            .collect();
        removed.into_iter().collect()
    }
}

/// Helper to adjust offsets after rows are removed
///
/// When the row at offset I is removed, every offset > I moves down by one
/// and offset I itself disappears.
pub struct IndexAdjuster;

impl IndexAdjuster {
    /// Adjust an offset after a batch deletion. `deleted` must be sorted
    /// ascending and hold pre-removal offsets.
    pub fn adjust_for_deletes(parent_index: usize, deleted: &[usize]) -> Option<usize> {
        match deleted.binary_search(&parent_index) {
            Ok(_) => None,
            Err(below) => Some(parent_index - below),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_delta_basic() {
        let mut delta = RowDelta::new(3);
        assert!(delta.is_empty());
        assert_eq!(delta.generation(), 3);

        delta.push(TableChange::RowInserted { index: 4 });
        delta.push(TableChange::RowUpdated {
            index: 1,
            columns: vec!["delay".to_string()],
        });
        delta.push(TableChange::RowInserted { index: 5 });

        assert_eq!(delta.len(), 3);
        assert_eq!(delta.inserted_count(), 2);
        assert_eq!(delta.updated_count(), 1);
        assert_eq!(delta.touched_rows().into_iter().collect::<Vec<_>>(), vec![1, 4, 5]);
        assert!(!delta.is_reset());
        assert!(delta.removed_rows().is_empty());
    }

    #[test]
    fn test_row_delta_removal() {
        let mut delta = RowDelta::new(1);
        delta.push(TableChange::RowsRemoved { indices: vec![0, 2] });
        assert_eq!(delta.removed_count(), 2);
        assert_eq!(delta.removed_rows(), vec![0, 2]);
        assert!(!delta.is_reset());
        assert!(delta.touched_rows().is_empty());

        let mut cleared = RowDelta::new(2);
        cleared.push(TableChange::Cleared);
        cleared.push(TableChange::RowInserted { index: 0 });
        assert!(cleared.is_reset());
        assert!(cleared.removed_rows().is_empty());
    }

    #[test]
    fn test_index_adjuster_batch_delete() {
        let deleted = [1, 3, 4];
        assert_eq!(IndexAdjuster::adjust_for_deletes(0, &deleted), Some(0));
        assert_eq!(IndexAdjuster::adjust_for_deletes(1, &deleted), None);
        assert_eq!(IndexAdjuster::adjust_for_deletes(2, &deleted), Some(1));
        assert_eq!(IndexAdjuster::adjust_for_deletes(4, &deleted), None);
        assert_eq!(IndexAdjuster::adjust_for_deletes(7, &deleted), Some(4));
    }
}
