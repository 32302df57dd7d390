//! Delta engine - turns a table `RowDelta` into grid patches for one view
//!
//! Every view keeps the grid it last published (the baseline). After a table
//! mutation the pivot state is brought up to date, only the affected grid
//! rows are recomputed, and the differences against the baseline are emitted
//! as `DeltaEntry` values. Applying those entries to the baseline with
//! `Grid::apply` gives exactly the grid a fresh view would build.
//!
//! Removed rows are unlinked from the pivot state and the survivors
//! renumbered, so a removal only touches the rows that held the removed
//! members. A clear or replace rebuilds the state.
//!
//! Entry order within a delta is: column set change, row removals, row
//! additions (ascending position), cell changes, degraded-marker changes,
//! then a final row order if the additions and removals alone do not
//! produce it.

use crate::changeset::RowDelta;
use crate::column::ColumnValue;
use crate::pivot::{ColumnSpec, DegradedCell, Grid, PivotEngine, RowKey};
use crate::table::Table;
use log::{trace, warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// One grid patch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeltaEntry {
    /// The column list changed; existing rows keep their values by name and
    /// read null in new columns
    Columns { columns: Vec<ColumnSpec> },

    RowAdded {
        row: RowKey,
        position: usize,
        values: Vec<ColumnValue>,
    },

    RowRemoved { row: RowKey },

    Cell {
        row: RowKey,
        column: String,
        value: ColumnValue,
    },

    /// The row's degraded columns are now exactly `columns`
    Degraded { row: RowKey, columns: Vec<String> },

    Order { order: Vec<RowKey> },
}

/// The patches a view publishes for one table mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewDelta {
    /// Table generation the delta brings the view to
    pub generation: u64,
    pub entries: Vec<DeltaEntry>,
    /// Cells recomputed in this delta that could not be aggregated
    pub degraded: Vec<DegradedCell>,
}

impl ViewDelta {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Grid {
    /// Patch this grid in place.
    pub fn apply(&mut self, entries: &[DeltaEntry]) {
        for entry in entries {
            match entry {
                DeltaEntry::Columns { columns } => {
                    let positions: Vec<Option<usize>> =
                        columns.iter().map(|c| self.column_index(&c.name)).collect();
                    for values in self.cells.values_mut() {
                        *values = positions
                            .iter()
                            .map(|pos| {
                                pos.and_then(|i| values.get(i).cloned())
                                    .unwrap_or(ColumnValue::Null)
                            })
                            .collect();
                    }
                    for marked in self.degraded.values_mut() {
                        marked.retain(|name| columns.iter().any(|c| &c.name == name));
                    }
                    self.degraded.retain(|_, marked| !marked.is_empty());
                    self.columns = columns.clone();
                }
                DeltaEntry::RowRemoved { row } => {
                    self.degraded.remove(row);
                    if self.cells.remove(row).is_some() {
                        self.order.retain(|key| key != row);
                    }
                }
                DeltaEntry::RowAdded { row, position, values } => {
                    if self.cells.insert(row.clone(), values.clone()).is_some() {
                        self.order.retain(|key| key != row);
                    }
                    let at = (*position).min(self.order.len());
                    self.order.insert(at, row.clone());
                }
                DeltaEntry::Cell { row, column, value } => {
                    if let Some(i) = self.column_index(column) {
                        if let Some(cell) = self.cells.get_mut(row).and_then(|v| v.get_mut(i)) {
                            *cell = value.clone();
                        }
                    }
                }
                DeltaEntry::Degraded { row, columns } => {
                    if columns.is_empty() {
                        self.degraded.remove(row);
                    } else {
                        self.degraded.insert(row.clone(), columns.clone());
                    }
                }
                DeltaEntry::Order { order } => {
                    self.order = order.clone();
                }
            }
        }
    }
}

/// Bring `engine` up to date with `change` and patch `baseline`, returning
/// the patches applied.
pub fn compute_delta(
    engine: &mut PivotEngine,
    table: &Table,
    baseline: &mut Grid,
    change: &RowDelta,
) -> ViewDelta {
    let candidates: Vec<RowKey> = if change.is_reset() {
        engine.rebuild(table);
        let mut keys = baseline.order.clone();
        let known: HashSet<RowKey> = keys.iter().cloned().collect();
        keys.extend(engine.order().into_iter().filter(|k| !known.contains(k)));
        keys
    } else {
        let mut keys = engine.remove_rows(table, &change.removed_rows());
        let touched = change.touched_rows();
        if !touched.is_empty() {
            let known: HashSet<RowKey> = keys.iter().cloned().collect();
            let applied = engine.apply_rows(table, &touched);
            keys.extend(applied.into_iter().filter(|k| !known.contains(k)));
        }
        keys
    };

    let delta = diff(engine, table, baseline, &candidates, change.generation());
    baseline.apply(&delta.entries);

    for cell in &delta.degraded {
        warn!(
            "Degraded cell {:?} / '{}' at generation {}: {}",
            cell.row, cell.column, delta.generation, cell.message
        );
    }
    trace!(
        "View delta at generation {}: {} entries from {} candidate rows",
        delta.generation,
        delta.entries.len(),
        candidates.len()
    );
    delta
}

fn diff(
    engine: &PivotEngine,
    table: &Table,
    baseline: &Grid,
    candidates: &[RowKey],
    generation: u64,
) -> ViewDelta {
    let split_paths = engine.split_paths();
    let columns = engine.columns_for(&split_paths);
    let columns_changed = columns != baseline.columns;

    // Baseline column position for each new column
    let remap: Vec<Option<usize>> = columns.iter().map(|c| baseline.column_index(&c.name)).collect();
    let old_row = |key: &RowKey| -> Option<Vec<ColumnValue>> {
        baseline.row(key).map(|values| {
            remap
                .iter()
                .map(|pos| pos.and_then(|i| values.get(i).cloned()).unwrap_or(ColumnValue::Null))
                .collect()
        })
    };

    let mut degraded = Vec::new();
    let mut removed = Vec::new();
    let mut added = Vec::new();
    let mut cells = Vec::new();
    let mut markers = Vec::new();

    for key in candidates {
        let old = old_row(key);
        let first = degraded.len();
        let new = engine.row_values(table, key, &split_paths, &mut degraded);
        if new.is_some() {
            let now: Vec<String> = degraded[first..].iter().map(|c| c.column.clone()).collect();
            let before: Vec<String> = baseline
                .degraded
                .get(key)
                .map(|marked| {
                    marked
                        .iter()
                        .filter(|name| columns.iter().any(|c| &c.name == *name))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            if now != before {
                markers.push(DeltaEntry::Degraded {
                    row: key.clone(),
                    columns: now,
                });
            }
        }
        match (old, new) {
            (Some(_), None) => removed.push(DeltaEntry::RowRemoved { row: key.clone() }),
            (None, Some(values)) => added.push((key.clone(), values)),
            (Some(old), Some(new)) => {
                for (i, (before, after)) in old.iter().zip(new).enumerate() {
                    if *before != after {
                        cells.push(DeltaEntry::Cell {
                            row: key.clone(),
                            column: columns[i].name.clone(),
                            value: after,
                        });
                    }
                }
            }
            (None, None) => {}
        }
    }

    let order = engine.order();
    let mut entries = Vec::with_capacity(removed.len() + added.len() + cells.len() + markers.len() + 2);
    if columns_changed {
        entries.push(DeltaEntry::Columns { columns });
    }

    // Replay removals and additions on the old order to see whether an
    // explicit reorder is still needed.
    let gone: HashSet<&RowKey> = removed
        .iter()
        .filter_map(|e| match e {
            DeltaEntry::RowRemoved { row } => Some(row),
            _ => None,
        })
        .collect();
    let mut simulated: Vec<RowKey> = baseline.order.iter().filter(|k| !gone.contains(k)).cloned().collect();
    entries.extend(removed);

    if !added.is_empty() {
        let positions: HashMap<&RowKey, usize> = order.iter().enumerate().map(|(i, k)| (k, i)).collect();
        let mut placed: Vec<(usize, RowKey, Vec<ColumnValue>)> = added
            .into_iter()
            .map(|(key, values)| (positions.get(&key).copied().unwrap_or(order.len()), key, values))
            .collect();
        placed.sort_by_key(|(position, _, _)| *position);
        for (position, row, values) in placed {
            simulated.insert(position.min(simulated.len()), row.clone());
            entries.push(DeltaEntry::RowAdded { row, position, values });
        }
    }

    entries.extend(cells);
    entries.extend(markers);
    if simulated != order {
        entries.push(DeltaEntry::Order { order });
    }

    ViewDelta {
        generation,
        entries,
        degraded,
    }
}
