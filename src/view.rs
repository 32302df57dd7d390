//! Live views
//!
//! A `LiveView` is a registered pivot over a `LiveTable`. It owns its
//! `PivotEngine` and its last published grid; every table mutation patches
//! the grid synchronously and hands the resulting `ViewDelta` to the view's
//! subscribers before the mutation returns.
//!
//! Dropping or deleting a `LiveView` unregisters it; a recompute that races
//! with the unregistration is discarded instead of delivered.

use crate::changeset::RowDelta;
use crate::column::ColumnValue;
use crate::config::ViewConfig;
use crate::delta::{compute_delta, ViewDelta};
use crate::error::{EngineError, Result};
use crate::live::{lock, read, TableShared};
use crate::pivot::{ColumnSpec, Grid, PivotEngine, Viewport};
use crate::table::{Row, Table};
use log::{debug, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Delta callback. Returning `false` unsubscribes it.
///
/// Callbacks run while the view is locked and must not call back into it.
pub type Subscriber = Box<dyn Fn(&Arc<ViewDelta>) -> bool + Send + Sync>;

/// Row and column counts of a view and its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub num_view_rows: usize,
    pub num_view_columns: usize,
    pub num_table_rows: usize,
    pub num_table_columns: usize,
}

struct ViewState {
    engine: PivotEngine,
    grid: Grid,
    generation: u64,
}

pub(crate) struct ViewShared {
    id: u64,
    config: ViewConfig,
    state: Mutex<ViewState>,
    subscribers: Mutex<Vec<(u64, Subscriber)>>,
    active: AtomicBool,
}

impl ViewShared {
    pub(crate) fn new(id: u64, config: ViewConfig, engine: PivotEngine, grid: Grid, generation: u64) -> Self {
        ViewShared {
            id,
            config,
            state: Mutex::new(ViewState {
                engine,
                grid,
                generation,
            }),
            subscribers: Mutex::new(Vec::new()),
            active: AtomicBool::new(true),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
        lock(&self.subscribers).clear();
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Patch this view for a table mutation and deliver the delta. Returns
    /// the delta when it was published.
    pub(crate) fn on_table_change(&self, table: &Table, change: &RowDelta) -> Option<Arc<ViewDelta>> {
        let mut state = lock(&self.state);
        if !self.is_active() {
            return None;
        }

        let ViewState {
            engine,
            grid,
            generation,
        } = &mut *state;
        let delta = compute_delta(engine, table, grid, change);
        *generation = delta.generation;

        if delta.is_empty() && delta.degraded.is_empty() {
            return None;
        }
        // Unregistered while recomputing
        if !self.is_active() {
            return None;
        }

        let delta = Arc::new(delta);
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|(id, callback)| {
            let keep = callback(&delta);
            if !keep {
                warn!("View {}: dropping closed subscriber {}", self.id, id);
            }
            keep
        });
        Some(delta)
    }
}

/// A live pivot view over a `LiveTable`.
///
/// ```
/// use livepivot::{ColumnValue, LiveTable, ViewConfig};
/// use std::collections::HashMap;
///
/// let table = LiveTable::from_json("t", r#"[{"a": 1, "b": 2}, {"a": 3, "b": 4}]"#, None).unwrap();
/// let view = table.view(ViewConfig::new().with_group_by(["a"])).unwrap();
///
/// let dims = view.dimensions().unwrap();
/// assert_eq!((dims.num_view_rows, dims.num_view_columns), (3, 3));
///
/// let total = &view.to_records().unwrap()[0];
/// assert_eq!(total["b"], ColumnValue::Integer(6));
///
/// table.update(vec![HashMap::from([("a".to_string(), ColumnValue::Integer(5))])]).unwrap();
/// assert_eq!(view.dimensions().unwrap().num_view_rows, 4);
/// ```
pub struct LiveView {
    table: Arc<TableShared>,
    shared: Arc<ViewShared>,
}

impl LiveView {
    pub(crate) fn new(table: Arc<TableShared>, shared: Arc<ViewShared>) -> Self {
        LiveView { table, shared }
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn config(&self) -> &ViewConfig {
        &self.shared.config
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    fn check_active(&self) -> Result<()> {
        if self.shared.is_active() {
            Ok(())
        } else {
            Err(EngineError::State(format!("View {} has been deleted", self.shared.id)))
        }
    }

    fn with_grid<T>(&self, f: impl FnOnce(&Grid) -> T) -> Result<T> {
        let state = lock(&self.shared.state);
        self.check_active()?;
        Ok(f(&state.grid))
    }

    /// Output rows in display order.
    pub fn to_records(&self) -> Result<Vec<Row>> {
        self.with_grid(Grid::to_records)
    }

    pub fn to_columns(&self) -> Result<Vec<(String, Vec<ColumnValue>)>> {
        self.with_grid(Grid::to_columns)
    }

    /// Rows and leaf columns inside `viewport`; group-by columns are always
    /// included.
    pub fn to_records_window(&self, viewport: &Viewport) -> Result<Vec<Row>> {
        self.with_grid(|grid| grid.window(viewport, self.header_columns()).to_records())
    }

    pub fn to_columns_window(&self, viewport: &Viewport) -> Result<Vec<(String, Vec<ColumnValue>)>> {
        self.with_grid(|grid| grid.window(viewport, self.header_columns()).to_columns())
    }

    /// A copy of the part of the grid inside `viewport`.
    pub fn snapshot_window(&self, viewport: &Viewport) -> Result<Grid> {
        self.with_grid(|grid| grid.window(viewport, self.header_columns()))
    }

    fn header_columns(&self) -> usize {
        self.shared.config.group_by.len()
    }

    /// Output columns with their types.
    pub fn schema(&self) -> Result<Vec<ColumnSpec>> {
        self.with_grid(|grid| grid.columns.clone())
    }

    pub fn dimensions(&self) -> Result<Dimensions> {
        let (num_view_rows, num_view_columns) = self.with_grid(|g| (g.num_rows(), g.num_columns()))?;
        let data = read(&self.table.data);
        Ok(Dimensions {
            num_view_rows,
            num_view_columns,
            num_table_rows: data.len(),
            num_table_columns: data.schema().len(),
        })
    }

    /// A copy of the current grid.
    pub fn snapshot(&self) -> Result<Grid> {
        self.with_grid(Grid::clone)
    }

    /// Table generation the grid reflects.
    pub fn generation(&self) -> Result<u64> {
        let state = lock(&self.shared.state);
        self.check_active()?;
        Ok(state.generation)
    }

    /// Register a delta callback; returns its id.
    pub fn on_update<F>(&self, callback: F) -> Result<u64>
    where
        F: Fn(&Arc<ViewDelta>) -> bool + Send + Sync + 'static,
    {
        self.subscribe_with(callback).map(|(_, id)| id)
    }

    /// Remove a callback registered with `on_update`.
    pub fn remove_update(&self, id: u64) -> bool {
        let mut subscribers = lock(&self.shared.subscribers);
        let before = subscribers.len();
        subscribers.retain(|(sub, _)| *sub != id);
        subscribers.len() != before
    }

    /// Snapshot the grid and register `callback` atomically: the callback
    /// receives exactly the deltas that follow the returned grid.
    pub fn subscribe_with<F>(&self, callback: F) -> Result<(Grid, u64)>
    where
        F: Fn(&Arc<ViewDelta>) -> bool + Send + Sync + 'static,
    {
        let state = lock(&self.shared.state);
        self.check_active()?;
        let id = NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed);
        lock(&self.shared.subscribers).push((id, Box::new(callback)));
        Ok((state.grid.clone(), id))
    }

    /// Snapshot plus a channel of the deltas that follow it.
    pub fn subscribe(&self) -> Result<(Grid, UnboundedReceiver<Arc<ViewDelta>>)> {
        let (tx, rx) = unbounded_channel();
        let (grid, _) = self.subscribe_with(move |delta| tx.send(Arc::clone(delta)).is_ok())?;
        Ok((grid, rx))
    }

    pub fn num_subscribers(&self) -> usize {
        lock(&self.shared.subscribers).len()
    }

    /// Unregister the view. Later calls fail with a state error.
    pub fn delete(&self) -> Result<()> {
        self.check_active()?;
        self.release();
        Ok(())
    }

    fn release(&self) {
        if self.shared.is_active() {
            self.shared.deactivate();
            lock(&self.table.views).retain(|v| !Arc::ptr_eq(v, &self.shared));
            debug!("Deleted view {}", self.shared.id);
        }
    }

    /// `{"schema": [{name, type}], "rows": [{column: value}]}`
    pub fn to_json(&self) -> Result<serde_json::Value> {
        self.with_grid(|grid| {
            let rows: Vec<serde_json::Value> = grid
                .rows()
                .map(|(_, values)| {
                    let object = grid
                        .columns
                        .iter()
                        .zip(values)
                        .map(|(spec, value)| (spec.name.clone(), value.to_json()))
                        .collect::<serde_json::Map<_, _>>();
                    serde_json::Value::Object(object)
                })
                .collect();
            serde_json::json!({
                "schema": grid.columns,
                "rows": rows,
            })
        })
    }
}

impl Drop for LiveView {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for LiveView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveView")
            .field("id", &self.shared.id)
            .field("config", &self.shared.config)
            .field("active", &self.shared.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnType;
    use crate::delta::DeltaEntry;
    use crate::live::LiveTable;
    use crate::pivot::RowKey;
    use crate::table::Schema;
    use std::collections::HashMap;

    fn row(pairs: &[(&str, ColumnValue)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn table() -> LiveTable {
        let schema = Schema::new(vec![
            ("id".to_string(), ColumnType::Integer, false),
            ("line".to_string(), ColumnType::String, true),
            ("delay".to_string(), ColumnType::Float, true),
        ]);
        let table = LiveTable::new("trips", schema, Some("id")).unwrap();
        table
            .update(vec![
                row(&[("id", 1.into()), ("line", "C".into()), ("delay", 1.0.into())]),
                row(&[("id", 2.into()), ("line", "A".into()), ("delay", 2.0.into())]),
            ])
            .unwrap();
        table
    }

    #[test]
    fn test_dimensions() {
        let table = table();
        let view = table.view(ViewConfig::new().with_group_by(["line"])).unwrap();
        assert_eq!(
            view.dimensions().unwrap(),
            Dimensions {
                num_view_rows: 3,
                num_view_columns: 4,
                num_table_rows: 2,
                num_table_columns: 3,
            }
        );
    }

    #[test]
    fn test_windowed_reads() {
        let table = table();
        table
            .update(vec![row(&[("id", 3.into()), ("line", "B".into()), ("delay", 4.0.into())])])
            .unwrap();
        let view = table.view(ViewConfig::new().with_group_by(["line"])).unwrap();

        let records = view
            .to_records_window(&Viewport::rows(1, 3).with_columns(2, 3))
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].len(), 2);
        assert_eq!(records[0]["line (Group by 1)"], ColumnValue::from("C"));
        assert_eq!(records[0]["delay"], ColumnValue::Float(1.0));
        assert_eq!(records[1]["delay"], ColumnValue::Float(2.0));

        let columns = view.to_columns_window(&Viewport::rows(3, 10)).unwrap();
        assert_eq!(columns.len(), 4);
        assert_eq!(columns[0], ("line (Group by 1)".to_string(), vec![ColumnValue::from("B")]));

        let flat = table.view(ViewConfig::new().with_columns(["id"])).unwrap();
        let ids = flat.to_columns_window(&Viewport { start_row: Some(1), ..Default::default() }).unwrap();
        assert_eq!(ids, vec![("id".to_string(), vec![ColumnValue::Integer(2), ColumnValue::Integer(3)])]);
    }

    #[test]
    fn test_subscribe_receives_deltas() {
        let table = table();
        let view = table.view(ViewConfig::new().with_columns(["delay"]).with_group_by(["line"])).unwrap();
        let (mut grid, mut rx) = view.subscribe().unwrap();

        table.update(vec![row(&[("id", 3.into()), ("line", "C".into()), ("delay", 4.0.into())])]).unwrap();
        let delta = rx.try_recv().unwrap();
        assert!(delta.entries.contains(&DeltaEntry::Cell {
            row: RowKey::Path(vec!["C".into()]),
            column: "delay".to_string(),
            value: ColumnValue::Float(5.0),
        }));

        grid.apply(&delta.entries);
        assert_eq!(grid, view.snapshot().unwrap());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_on_update_and_remove() {
        let table = table();
        let view = table.view(ViewConfig::new()).unwrap();
        let seen = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&seen);
        let id = view
            .on_update(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            })
            .unwrap();

        table.update(vec![row(&[("id", 9.into())])]).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        assert!(view.remove_update(id));
        table.update(vec![row(&[("id", 10.into())])]).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(view.num_subscribers(), 0);
    }

    #[test]
    fn test_closed_receiver_is_dropped() {
        let table = table();
        let view = table.view(ViewConfig::new()).unwrap();
        let (_, rx) = view.subscribe().unwrap();
        drop(rx);
        table.update(vec![row(&[("id", 9.into())])]).unwrap();
        assert_eq!(view.num_subscribers(), 0);
    }

    #[test]
    fn test_deleted_view_is_unregistered() {
        let table = table();
        let view = table.view(ViewConfig::new()).unwrap();
        assert_eq!(table.num_views(), 1);
        view.delete().unwrap();
        assert_eq!(table.num_views(), 0);
        assert!(matches!(view.to_records(), Err(EngineError::State(_))));
        assert!(matches!(view.delete(), Err(EngineError::State(_))));

        {
            let _scoped = table.view(ViewConfig::new()).unwrap();
            assert_eq!(table.num_views(), 1);
        }
        assert_eq!(table.num_views(), 0);
    }

    #[test]
    fn test_to_json_shape() {
        let table = table();
        let view = table.view(ViewConfig::new().with_columns(["delay"]).with_group_by(["line"])).unwrap();
        let json = view.to_json().unwrap();
        assert_eq!(json["schema"][0]["name"], "line (Group by 1)");
        assert_eq!(json["schema"][1]["type"], "float");
        assert_eq!(json["rows"][0]["delay"], 3.0);
        assert!(json["rows"][0]["line (Group by 1)"].is_null());

        let expected: HashMap<&str, serde_json::Value> =
            HashMap::from([("line (Group by 1)", "C".into()), ("delay", 1.0.into())]);
        for (k, v) in expected {
            assert_eq!(json["rows"][1][k], v);
        }
    }
}
