//! Pivot engine.
//!
//! The engine keeps, per view, a cache of each base row's group and split
//! key tuples plus the member rows of every group node (all prefixes of every
//! group path, the empty path being the grand total) and every split node.
//! From that state it produces the output grid:
//!
//! * row order: depth-first over the group tree, siblings in sort order or
//!   first-seen order (smallest member offset, null keys last);
//! * columns: `"<col> (Group by N)"` pseudo columns, then every leaf column
//!   once per split path, named `"<split labels joined by |>|<leaf>"`;
//! * cells: the leaf's aggregate over the rows shared by the group node and
//!   the split path, or null when there are none.
//!
//! Views without group-by are flat: one grid row per filtered base row with
//! raw values, each row filling only its own split's columns. Flat rows are
//! keyed by the table's stable row id, so removing a row never renames the
//! rows after it.
//!
//! Computed columns are evaluated per base row and stored next to the table
//! columns; a plan column index past the table width reads them.
//!
//! Because first-seen order and aggregation both depend only on the current
//! member sets (visited in ascending offset order), recomputing a node after
//! any sequence of updates gives exactly what a fresh build would.

use crate::changeset::IndexAdjuster;
use crate::column::{Column, ColumnType, ColumnValue};
use crate::config::{ResolvedSort, ViewPlan};
use crate::expr;
use crate::table::{Row, Table};
use log::trace;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::Range;

/// Key tuple of a group or split path.
pub type GroupPath = Vec<ColumnValue>;

/// Identity of a grid row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum RowKey {
    /// Group path of an aggregated row; empty for the grand total
    Path(GroupPath),
    /// Stable table row id of a flat row
    Row(u64),
}

/// Name and type of a grid column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        ColumnSpec {
            name: name.into(),
            column_type,
        }
    }
}

/// A cell whose aggregate could not be computed; it reads as null.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DegradedCell {
    pub row: RowKey,
    pub column: String,
    pub message: String,
}

/// A rectangular window over a grid. Ends are exclusive and every bound
/// is optional. Column bounds count leaf columns only; group-by pseudo
/// columns are always kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Viewport {
    pub start_row: Option<usize>,
    pub end_row: Option<usize>,
    pub start_col: Option<usize>,
    pub end_col: Option<usize>,
}

impl Viewport {
    pub fn rows(start: usize, end: usize) -> Self {
        Viewport {
            start_row: Some(start),
            end_row: Some(end),
            ..Default::default()
        }
    }

    pub fn with_columns(mut self, start: usize, end: usize) -> Self {
        self.start_col = Some(start);
        self.end_col = Some(end);
        self
    }

    fn clamp(start: Option<usize>, end: Option<usize>, len: usize) -> Range<usize> {
        let end = end.unwrap_or(len).min(len);
        start.unwrap_or(0).min(end)..end
    }
}

/// Materialized view output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    pub columns: Vec<ColumnSpec>,
    pub order: Vec<RowKey>,
    pub cells: HashMap<RowKey, Vec<ColumnValue>>,
    /// Columns of each row whose cell could not be aggregated
    pub degraded: HashMap<RowKey, Vec<String>>,
}

impl Grid {
    pub fn num_rows(&self) -> usize {
        self.order.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn row(&self, key: &RowKey) -> Option<&[ColumnValue]> {
        self.cells.get(key).map(Vec::as_slice)
    }

    /// Rows in display order.
    pub fn rows(&self) -> impl Iterator<Item = (&RowKey, &[ColumnValue])> + '_ {
        self.order
            .iter()
            .filter_map(move |key| self.cells.get(key).map(|values| (key, values.as_slice())))
    }

    pub fn is_degraded(&self, key: &RowKey, column: &str) -> bool {
        self.degraded
            .get(key)
            .map_or(false, |columns| columns.iter().any(|c| c == column))
    }

    /// Degraded `(row, column)` pairs in display order.
    pub fn degraded_cells(&self) -> Vec<(RowKey, String)> {
        self.order
            .iter()
            .filter_map(|key| self.degraded.get(key).map(|columns| (key, columns)))
            .flat_map(|(key, columns)| columns.iter().map(move |c| (key.clone(), c.clone())))
            .collect()
    }

    /// Copy of the rows and columns inside `viewport`. The first
    /// `header_columns` columns are row headers and always kept.
    pub fn window(&self, viewport: &Viewport, header_columns: usize) -> Grid {
        let header = header_columns.min(self.columns.len());
        let leaves = Viewport::clamp(viewport.start_col, viewport.end_col, self.columns.len() - header);
        let keep: Vec<usize> = (0..header).chain(leaves.map(|i| i + header)).collect();
        let rows = Viewport::clamp(viewport.start_row, viewport.end_row, self.order.len());

        let columns: Vec<ColumnSpec> = keep.iter().map(|&i| self.columns[i].clone()).collect();
        let order: Vec<RowKey> = self.order[rows].to_vec();
        let cells = order
            .iter()
            .filter_map(|key| {
                let values = self.cells.get(key)?;
                let kept = keep
                    .iter()
                    .map(|&i| values.get(i).cloned().unwrap_or(ColumnValue::Null))
                    .collect();
                Some((key.clone(), kept))
            })
            .collect();
        let degraded = order
            .iter()
            .filter_map(|key| {
                let marked: Vec<String> = self
                    .degraded
                    .get(key)?
                    .iter()
                    .filter(|name| columns.iter().any(|c| &c.name == *name))
                    .cloned()
                    .collect();
                (!marked.is_empty()).then(|| (key.clone(), marked))
            })
            .collect();

        Grid {
            columns,
            order,
            cells,
            degraded,
        }
    }

    pub fn to_records(&self) -> Vec<Row> {
        self.rows()
            .map(|(_, values)| {
                self.columns
                    .iter()
                    .zip(values)
                    .map(|(spec, value)| (spec.name.clone(), value.clone()))
                    .collect()
            })
            .collect()
    }

    pub fn to_columns(&self) -> Vec<(String, Vec<ColumnValue>)> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                let values = self
                    .rows()
                    .map(|(_, values)| values.get(i).cloned().unwrap_or(ColumnValue::Null))
                    .collect();
                (spec.name.clone(), values)
            })
            .collect()
    }
}

/// Cached keys of one base row that passes the filter.
#[derive(Debug, Clone, PartialEq)]
struct RowEntry {
    id: u64,
    group: GroupPath,
    split: GroupPath,
}

#[derive(Debug, Default)]
struct Node {
    members: BTreeSet<usize>,
    /// Sort column aggregates over `members`, one per sort key
    sort_values: Vec<ColumnValue>,
}

/// Per-view pivot state.
pub struct PivotEngine {
    plan: ViewPlan,
    /// Indexed by base row offset; `None` when filtered out
    entries: Vec<Option<RowEntry>>,
    groups: HashMap<GroupPath, Node>,
    splits: HashMap<GroupPath, Node>,
    /// Display order of a flat view
    flat_order: Vec<usize>,
    /// Row id -> offset of every flat row passing the filter
    flat_rows: HashMap<u64, usize>,
    /// Computed column values by base row offset, one per plan expression
    computed: Vec<Column>,
}

impl PivotEngine {
    pub fn new(plan: ViewPlan) -> Self {
        PivotEngine {
            plan,
            entries: Vec::new(),
            groups: HashMap::new(),
            splits: HashMap::new(),
            flat_order: Vec::new(),
            flat_rows: HashMap::new(),
            computed: Vec::new(),
        }
    }

    pub fn plan(&self) -> &ViewPlan {
        &self.plan
    }

    /// Number of base rows passing the filter.
    pub fn filtered_rows(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    /// Discard all cached state and re-derive it from `table`.
    pub fn rebuild(&mut self, table: &Table) {
        self.computed = self
            .plan
            .expressions
            .iter()
            .map(|e| Column::new(e.name.clone(), e.column_type, true))
            .collect();
        for offset in 0..table.len() {
            self.compute_row(table, offset);
        }

        self.entries = (0..table.len()).map(|offset| self.entry_for(table, offset)).collect();
        self.groups.clear();
        self.splits.clear();
        self.flat_order.clear();
        self.flat_rows.clear();

        for offset in 0..self.entries.len() {
            if let Some(entry) = self.entries[offset].take() {
                self.link_nodes(offset, &entry);
                if self.plan.is_flat() {
                    self.flat_order.push(offset);
                    self.flat_rows.insert(entry.id, offset);
                }
                self.entries[offset] = Some(entry);
            }
        }

        if self.plan.is_flat() {
            if !self.plan.sort.is_empty() {
                let mut order = std::mem::take(&mut self.flat_order);
                order.sort_by(|&a, &b| self.cmp_flat(table, a, b));
                self.flat_order = order;
            }
        } else if !self.plan.sort.is_empty() {
            let paths: Vec<GroupPath> = self.groups.keys().cloned().collect();
            for path in paths {
                self.refresh_sort_values(table, &path);
            }
        }
    }

    /// Re-key the rows at `touched` (post-mutation offsets of inserted or
    /// updated rows) and return the grid rows whose values may have changed.
    pub fn apply_rows(&mut self, table: &Table, touched: &BTreeSet<usize>) -> Vec<RowKey> {
        self.refresh_computed(table, touched);
        if self.entries.len() < table.len() {
            self.entries.resize(table.len(), None);
        }

        let mut seen = HashSet::new();
        let mut affected = Vec::new();
        let mut mark = |key: RowKey, affected: &mut Vec<RowKey>| {
            if seen.insert(key.clone()) {
                affected.push(key);
            }
        };

        // Unlink every touched row first so flat insertion compares against
        // rows that are already in their final place.
        for &offset in touched {
            if self.plan.is_flat() {
                if let Some(id) = table.row_id(offset) {
                    mark(RowKey::Row(id), &mut affected);
                }
            }
            let old = self.entries.get_mut(offset).and_then(Option::take);
            if let Some(old) = old {
                self.unlink_nodes(offset, &old);
                if self.plan.is_flat() {
                    self.flat_rows.remove(&old.id);
                    mark(RowKey::Row(old.id), &mut affected);
                    if let Some(pos) = self.flat_order.iter().position(|&o| o == offset) {
                        self.flat_order.remove(pos);
                    }
                } else {
                    for depth in 0..=old.group.len() {
                        mark(RowKey::Path(old.group[..depth].to_vec()), &mut affected);
                    }
                }
            }
        }

        for &offset in touched {
            if offset >= table.len() {
                continue;
            }
            let new = self.entry_for(table, offset);
            if let Some(entry) = &new {
                self.link_nodes(offset, entry);
                if self.plan.is_flat() {
                    let pos = self
                        .flat_order
                        .binary_search_by(|&existing| self.cmp_flat(table, existing, offset))
                        .unwrap_or_else(|pos| pos);
                    self.flat_order.insert(pos, offset);
                    self.flat_rows.insert(entry.id, offset);
                } else {
                    for depth in 0..=entry.group.len() {
                        mark(RowKey::Path(entry.group[..depth].to_vec()), &mut affected);
                    }
                }
            }
            self.entries[offset] = new;
        }

        self.refresh_affected_sort_values(table, &affected);
        affected
    }

    /// Drop the rows at `removed` (sorted pre-removal offsets), renumber
    /// the survivors and return the grid rows that lost members or vanished.
    /// `table` is the post-removal table.
    pub fn remove_rows(&mut self, table: &Table, removed: &[usize]) -> Vec<RowKey> {
        let mut seen = HashSet::new();
        let mut affected = Vec::new();

        for &offset in removed {
            let old = match self.entries.get_mut(offset).and_then(Option::take) {
                Some(old) => old,
                None => continue,
            };
            self.unlink_nodes(offset, &old);
            if self.plan.is_flat() {
                self.flat_rows.remove(&old.id);
                if seen.insert(RowKey::Row(old.id)) {
                    affected.push(RowKey::Row(old.id));
                }
            } else {
                for depth in 0..=old.group.len() {
                    let key = RowKey::Path(old.group[..depth].to_vec());
                    if seen.insert(key.clone()) {
                        affected.push(key);
                    }
                }
            }
        }

        let mut offset = 0;
        self.entries.retain(|_| {
            let keep = removed.binary_search(&offset).is_err();
            offset += 1;
            keep
        });
        for column in &mut self.computed {
            for &offset in removed.iter().rev() {
                if let Err(e) = column.delete(offset) {
                    trace!("Computed column '{}' has no row {}: {}", column.name(), offset, e);
                }
            }
        }

        let shift = |offset: usize| IndexAdjuster::adjust_for_deletes(offset, removed);
        for node in self.groups.values_mut().chain(self.splits.values_mut()) {
            node.members = node.members.iter().filter_map(|&o| shift(o)).collect();
        }
        self.flat_order = self.flat_order.iter().filter_map(|&o| shift(o)).collect();
        for offset in self.flat_rows.values_mut() {
            if let Some(moved) = shift(*offset) {
                *offset = moved;
            }
        }

        self.refresh_affected_sort_values(table, &affected);
        affected
    }

    fn refresh_affected_sort_values(&mut self, table: &Table, affected: &[RowKey]) {
        if self.plan.is_flat() || self.plan.sort.is_empty() {
            return;
        }
        for key in affected {
            if let RowKey::Path(path) = key {
                self.refresh_sort_values(table, path);
            }
        }
    }

    /// Evaluate computed columns for rows that changed and rows appended
    /// since the last call.
    fn refresh_computed(&mut self, table: &Table, touched: &BTreeSet<usize>) {
        let known = match self.computed.first() {
            Some(column) => column.len(),
            None => return,
        };
        for &offset in touched.iter().filter(|&&o| o < known) {
            self.compute_row(table, offset);
        }
        for offset in known..table.len() {
            self.compute_row(table, offset);
        }
    }

    fn compute_row(&mut self, table: &Table, offset: usize) {
        let schema = table.schema();
        let get = |name: &str| schema.get_column_index(name).map(|i| table.value_at(offset, i));
        for (expression, column) in self.plan.expressions.iter().zip(self.computed.iter_mut()) {
            let value = column
                .validate(expression.computed.eval(&get))
                .unwrap_or(ColumnValue::Null);
            let stored = if offset < column.len() {
                column.set(offset, value)
            } else {
                column.append(value)
            };
            if let Err(e) = stored {
                trace!("Computed column '{}' row {}: {}", expression.name, offset, e);
            }
        }
    }

    /// Storage behind a plan column index.
    fn column<'a>(&'a self, table: &'a Table, col: usize) -> Option<&'a Column> {
        let width = table.schema().len();
        if col < width {
            table.column_at(col)
        } else {
            self.computed.get(col - width)
        }
    }

    fn value(&self, table: &Table, offset: usize, col: usize) -> ColumnValue {
        self.column(table, col)
            .and_then(|column| column.get(offset).ok())
            .unwrap_or(ColumnValue::Null)
    }

    /// Value of a table or computed column by name.
    fn lookup(&self, table: &Table, offset: usize, name: &str) -> Option<ColumnValue> {
        let schema = table.schema();
        let col = schema.get_column_index(name).or_else(|| {
            self.plan
                .expressions
                .iter()
                .position(|e| e.name == name)
                .map(|i| schema.len() + i)
        })?;
        Some(self.value(table, offset, col))
    }

    fn entry_for(&self, table: &Table, offset: usize) -> Option<RowEntry> {
        if let Some(filter) = &self.plan.filter {
            let keep = expr::eval_expr_fast(filter, &|name: &str| self.lookup(table, offset, name));
            if !keep {
                return None;
            }
        }

        Some(RowEntry {
            id: table.row_id(offset)?,
            group: self.plan.group_by.iter().map(|d| self.value(table, offset, d.col)).collect(),
            split: self.plan.split_by.iter().map(|d| self.value(table, offset, d.col)).collect(),
        })
    }

    fn link_nodes(&mut self, offset: usize, entry: &RowEntry) {
        if !self.plan.is_flat() {
            for depth in 0..=entry.group.len() {
                self.groups
                    .entry(entry.group[..depth].to_vec())
                    .or_default()
                    .members
                    .insert(offset);
            }
        }
        for depth in 0..=entry.split.len() {
            self.splits
                .entry(entry.split[..depth].to_vec())
                .or_default()
                .members
                .insert(offset);
        }
    }

    fn unlink_nodes(&mut self, offset: usize, entry: &RowEntry) {
        if !self.plan.is_flat() {
            for depth in 0..=entry.group.len() {
                remove_member(&mut self.groups, &entry.group[..depth], offset);
            }
        }
        for depth in 0..=entry.split.len() {
            remove_member(&mut self.splits, &entry.split[..depth], offset);
        }
    }

    fn refresh_sort_values(&mut self, table: &Table, path: &[ColumnValue]) {
        let values = match self.groups.get(path) {
            Some(node) => self.sort_values(table, &node.members),
            None => return,
        };
        if let Some(node) = self.groups.get_mut(path) {
            node.sort_values = values;
        }
    }

    fn sort_values(&self, table: &Table, members: &BTreeSet<usize>) -> Vec<ColumnValue> {
        self.plan
            .sort
            .iter()
            .map(|s| {
                self.column(table, s.col)
                    .and_then(|column| s.aggregate.compute(column, members.iter().copied()).ok())
                    .unwrap_or(ColumnValue::Null)
            })
            .collect()
    }

    fn cmp_flat(&self, table: &Table, a: usize, b: usize) -> Ordering {
        for sort in &self.plan.sort {
            let ord = sort
                .key
                .compare(&self.value(table, a, sort.col), &self.value(table, b, sort.col));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.cmp(&b)
    }

    /// Split paths in column order. A view without split-by has the single
    /// empty path.
    pub fn split_paths(&self) -> Vec<GroupPath> {
        if self.plan.split_by.is_empty() {
            return vec![Vec::new()];
        }
        ordered_paths(&self.splits, &[])
            .into_iter()
            .filter(|path| path.len() == self.plan.split_by.len())
            .collect()
    }

    /// Output columns for the given split paths.
    pub fn columns_for(&self, split_paths: &[GroupPath]) -> Vec<ColumnSpec> {
        let mut columns = Vec::new();
        if !self.plan.is_flat() {
            for (i, dim) in self.plan.group_by.iter().enumerate() {
                columns.push(ColumnSpec::new(
                    format!("{} (Group by {})", dim.name, i + 1),
                    dim.column_type,
                ));
            }
        }
        for path in split_paths {
            let prefix = split_prefix(path);
            for leaf in &self.plan.leaves {
                columns.push(ColumnSpec::new(
                    format!("{}{}", prefix, leaf.name),
                    self.plan.leaf_type(leaf),
                ));
            }
        }
        columns
    }

    pub fn columns(&self) -> Vec<ColumnSpec> {
        self.columns_for(&self.split_paths())
    }

    /// Grid row order.
    pub fn order(&self) -> Vec<RowKey> {
        if self.plan.is_flat() {
            self.flat_order
                .iter()
                .filter_map(|&o| self.entries.get(o)?.as_ref().map(|e| RowKey::Row(e.id)))
                .collect()
        } else {
            ordered_paths(&self.groups, &self.plan.sort)
                .into_iter()
                .map(RowKey::Path)
                .collect()
        }
    }

    /// Compute the full value vector of one grid row, or `None` if the row
    /// does not exist. Cells that fail to aggregate are pushed to `degraded`
    /// and read as null.
    pub fn row_values(
        &self,
        table: &Table,
        key: &RowKey,
        split_paths: &[GroupPath],
        degraded: &mut Vec<DegradedCell>,
    ) -> Option<Vec<ColumnValue>> {
        match key {
            RowKey::Row(id) if self.plan.is_flat() => {
                let offset = *self.flat_rows.get(id)?;
                let entry = self.entries.get(offset)?.as_ref()?;
                let mut values = Vec::with_capacity(split_paths.len() * self.plan.leaves.len());
                for path in split_paths {
                    let own = *path == entry.split;
                    for leaf in &self.plan.leaves {
                        values.push(if own {
                            self.value(table, offset, leaf.col)
                        } else {
                            ColumnValue::Null
                        });
                    }
                }
                Some(values)
            }
            RowKey::Path(path) if !self.plan.is_flat() => {
                let node = self.groups.get(path)?;
                let width = self.plan.group_by.len() + split_paths.len() * self.plan.leaves.len();
                let mut values = Vec::with_capacity(width);
                for i in 0..self.plan.group_by.len() {
                    values.push(path.get(i).cloned().unwrap_or(ColumnValue::Null));
                }

                let mut parts: HashMap<&[ColumnValue], Vec<usize>> = HashMap::new();
                for &offset in &node.members {
                    if let Some(Some(entry)) = self.entries.get(offset) {
                        parts.entry(entry.split.as_slice()).or_default().push(offset);
                    }
                }

                for split in split_paths {
                    match parts.get(split.as_slice()) {
                        None => {
                            values.extend(std::iter::repeat(ColumnValue::Null).take(self.plan.leaves.len()))
                        }
                        Some(rows) => {
                            for leaf in &self.plan.leaves {
                                let result = match self.column(table, leaf.col) {
                                    Some(column) => leaf.aggregate.compute(column, rows.iter().copied()),
                                    None => Ok(ColumnValue::Null),
                                };
                                match result {
                                    Ok(value) => values.push(value),
                                    Err(message) => {
                                        degraded.push(DegradedCell {
                                            row: key.clone(),
                                            column: format!("{}{}", split_prefix(split), leaf.name),
                                            message,
                                        });
                                        values.push(ColumnValue::Null);
                                    }
                                }
                            }
                        }
                    }
                }
                Some(values)
            }
            _ => None,
        }
    }

    /// Build the complete grid from the current state.
    pub fn materialize(&self, table: &Table) -> (Grid, Vec<DegradedCell>) {
        let split_paths = self.split_paths();
        let columns = self.columns_for(&split_paths);
        let order = self.order();
        let mut degraded = Vec::new();
        let mut cells = HashMap::with_capacity(order.len());
        for key in &order {
            if let Some(values) = self.row_values(table, key, &split_paths, &mut degraded) {
                cells.insert(key.clone(), values);
            }
        }
        let mut marked: HashMap<RowKey, Vec<String>> = HashMap::new();
        for cell in &degraded {
            marked.entry(cell.row.clone()).or_default().push(cell.column.clone());
        }
        let grid = Grid {
            columns,
            order,
            cells,
            degraded: marked,
        };
        (grid, degraded)
    }
}

fn remove_member(nodes: &mut HashMap<GroupPath, Node>, path: &[ColumnValue], offset: usize) {
    let now_empty = match nodes.get_mut(path) {
        Some(node) => {
            node.members.remove(&offset);
            node.members.is_empty()
        }
        None => false,
    };
    if now_empty {
        nodes.remove(path);
    }
}

/// Column label of one split value. `|` and `\` are backslash-escaped and
/// null reads `\N`, which no escaped value can spell.
fn split_label(value: &ColumnValue) -> String {
    if value.is_null() {
        return "\\N".to_string();
    }
    let text = value.to_string();
    let mut label = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '|' || c == '\\' {
            label.push('\\');
        }
        label.push(c);
    }
    label
}

/// `"v1|v2|"` for a split path, empty for the root path.
fn split_prefix(path: &[ColumnValue]) -> String {
    let mut prefix = String::new();
    for value in path {
        prefix.push_str(&split_label(value));
        prefix.push('|');
    }
    prefix
}

/// Compare sibling nodes: sort keys first, then null keys last, then
/// first-seen (smallest member offset).
fn cmp_siblings(a: (&GroupPath, &Node), b: (&GroupPath, &Node), sort: &[ResolvedSort]) -> Ordering {
    for (i, s) in sort.iter().enumerate() {
        let null = ColumnValue::Null;
        let va = a.1.sort_values.get(i).unwrap_or(&null);
        let vb = b.1.sort_values.get(i).unwrap_or(&null);
        let ord = s.key.compare(va, vb);
        if ord != Ordering::Equal {
            return ord;
        }
    }

    let a_null = a.0.last().map_or(false, ColumnValue::is_null);
    let b_null = b.0.last().map_or(false, ColumnValue::is_null);
    a_null
        .cmp(&b_null)
        .then_with(|| a.1.members.first().cmp(&b.1.members.first()))
}

/// Depth-first listing of every node, root first.
fn ordered_paths(nodes: &HashMap<GroupPath, Node>, sort: &[ResolvedSort]) -> Vec<GroupPath> {
    let root: &[ColumnValue] = &[];
    if !nodes.contains_key(root) {
        return Vec::new();
    }

    let mut children: HashMap<&[ColumnValue], Vec<(&GroupPath, &Node)>> = HashMap::new();
    for (path, node) in nodes {
        if let Some((_, parent)) = path.split_last() {
            children.entry(parent).or_default().push((path, node));
        }
    }
    for siblings in children.values_mut() {
        siblings.sort_by(|a, b| cmp_siblings(*a, *b, sort));
    }

    let mut out = Vec::with_capacity(nodes.len());
    let mut stack: Vec<&[ColumnValue]> = vec![root];
    while let Some(path) = stack.pop() {
        out.push(path.to_vec());
        if let Some(siblings) = children.get(path) {
            for (child, _) in siblings.iter().rev() {
                stack.push(child.as_slice());
            }
        }
    }
    out
}
