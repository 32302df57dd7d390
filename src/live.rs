//! Shared, thread-safe tables with registered views
//!
//! `LiveTable` wraps a `Table` for concurrent use. Mutations are serialized
//! by a per-table writer lock. Inside it the data is changed under a short
//! exclusive section, then every registered view is recomputed under a
//! shared read section before the mutation returns. Readers never see a
//! table mid-mutation.

use crate::changeset::RowDelta;
use crate::column::ColumnValue;
use crate::config::ViewConfig;
use crate::error::{EngineError, Result};
use crate::pivot::{DegradedCell, PivotEngine};
use crate::table::{Row, Schema, Table};
use crate::view::{LiveView, ViewShared};
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

static NEXT_VIEW_ID: AtomicU64 = AtomicU64::new(1);

/// Receives every degraded cell published by the table's views, with the
/// table name.
pub type DegradedSink = Arc<dyn Fn(&str, &DegradedCell) + Send + Sync>;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct TableShared {
    pub(crate) data: RwLock<Table>,
    writer: Mutex<()>,
    pub(crate) views: Mutex<Vec<Arc<ViewShared>>>,
    destroyed: AtomicBool,
    degraded_sink: Mutex<Option<DegradedSink>>,
}

/// A table that views can observe. Cloning gives another handle to the
/// same table.
///
/// ```
/// use livepivot::{ColumnType, ColumnValue, LiveTable, Schema};
/// use std::collections::HashMap;
///
/// let schema = Schema::nullable(vec![
///     ("id".to_string(), ColumnType::Integer),
///     ("delay".to_string(), ColumnType::Float),
/// ]);
/// let table = LiveTable::new("trips", schema, Some("id")).unwrap();
///
/// let row = |id: i64, delay: f64| {
///     HashMap::from([
///         ("id".to_string(), ColumnValue::Integer(id)),
///         ("delay".to_string(), ColumnValue::Float(delay)),
///     ])
/// };
/// table.update(vec![row(1, 2.0), row(2, 3.0)]).unwrap();
/// table.update(vec![row(1, 5.0)]).unwrap();
///
/// assert_eq!(table.size().unwrap(), 2);
/// ```
#[derive(Clone)]
pub struct LiveTable {
    shared: Arc<TableShared>,
}

impl LiveTable {
    /// Create an empty table. `index` names the primary-key column.
    pub fn new(name: &str, schema: Schema, index: Option<&str>) -> Result<Self> {
        Ok(Self::from_table(Table::new(name.to_string(), schema, index)?))
    }

    pub fn from_table(table: Table) -> Self {
        debug!(
            "Created table '{}' with {} columns, {} rows",
            table.name(),
            table.schema().len(),
            table.len()
        );
        LiveTable {
            shared: Arc::new(TableShared {
                data: RwLock::new(table),
                writer: Mutex::new(()),
                views: Mutex::new(Vec::new()),
                destroyed: AtomicBool::new(false),
                degraded_sink: Mutex::new(None),
            }),
        }
    }

    /// Create a table from a batch of rows, inferring the schema.
    pub fn from_rows(name: &str, rows: Vec<Row>, index: Option<&str>) -> Result<Self> {
        Ok(Self::from_table(Table::from_rows(name.to_string(), rows, index)?))
    }

    /// See `Table::from_json`.
    pub fn from_json(name: &str, json: &str, index: Option<&str>) -> Result<Self> {
        Ok(Self::from_table(Table::from_json(name, json, index)?))
    }

    /// Load a view's current output into a new table. Every column takes the
    /// view column's type and is nullable.
    pub fn from_view(name: &str, view: &LiveView, index: Option<&str>) -> Result<Self> {
        let grid = view.snapshot()?;
        let schema = Schema::new(
            grid.columns
                .iter()
                .map(|c| (c.name.clone(), c.column_type, true))
                .collect(),
        );
        let mut table = Table::new(name.to_string(), schema, index)?;
        table.update(grid.to_records())?;
        Ok(Self::from_table(table))
    }

    fn check_alive(&self) -> Result<()> {
        if self.shared.destroyed.load(Ordering::SeqCst) {
            Err(EngineError::State(format!("Table '{}' has been deleted", self.name())))
        } else {
            Ok(())
        }
    }

    pub fn name(&self) -> String {
        read(&self.shared.data).name().to_string()
    }

    pub fn is_deleted(&self) -> bool {
        self.shared.destroyed.load(Ordering::SeqCst)
    }

    fn mutate<F>(&self, f: F) -> Result<RowDelta>
    where
        F: FnOnce(&mut Table) -> Result<RowDelta>,
    {
        let _writer = lock(&self.shared.writer);
        self.check_alive()?;

        let change = f(&mut write(&self.shared.data))?;
        if !change.is_empty() {
            self.notify(&change);
        }
        Ok(change)
    }

    fn notify(&self, change: &RowDelta) {
        let data = read(&self.shared.data);
        let views: Vec<Arc<ViewShared>> = lock(&self.shared.views).clone();
        let sink = lock(&self.shared.degraded_sink).clone();

        for view in views {
            if let Some(delta) = view.on_table_change(&data, change) {
                if let Some(sink) = &sink {
                    for cell in &delta.degraded {
                        sink(data.name(), cell);
                    }
                }
            }
        }
    }

    /// Upsert a batch of rows. See `Table::update`.
    pub fn update(&self, rows: Vec<Row>) -> Result<RowDelta> {
        self.mutate(|table| table.update(rows))
    }

    /// Upsert rows given as JSON: an array of objects or a single object.
    pub fn update_json(&self, value: &serde_json::Value) -> Result<RowDelta> {
        self.mutate(|table| {
            let rows = table.rows_from_json(value)?;
            table.update(rows)
        })
    }

    /// Remove rows by index value; unknown keys are ignored.
    pub fn remove(&self, keys: &[ColumnValue]) -> Result<RowDelta> {
        self.mutate(|table| table.remove(keys))
    }

    pub fn clear(&self) -> Result<RowDelta> {
        self.mutate(|table| Ok(table.clear()))
    }

    /// Drop every row, then insert `rows`.
    pub fn replace(&self, rows: Vec<Row>) -> Result<RowDelta> {
        self.mutate(|table| table.replace(rows))
    }

    /// Create and register a view; it starts from a full snapshot.
    pub fn view(&self, config: ViewConfig) -> Result<LiveView> {
        let _writer = lock(&self.shared.writer);
        self.check_alive()?;

        let data = read(&self.shared.data);
        let plan = config.resolve(data.schema())?;
        let mut engine = PivotEngine::new(plan);
        engine.rebuild(&data);
        let (grid, degraded) = engine.materialize(&data);

        let id = NEXT_VIEW_ID.fetch_add(1, Ordering::Relaxed);
        if !degraded.is_empty() {
            let sink = lock(&self.shared.degraded_sink).clone();
            for cell in &degraded {
                warn!(
                    "Degraded cell {:?} / '{}' in new view {}: {}",
                    cell.row, cell.column, id, cell.message
                );
                if let Some(sink) = &sink {
                    sink(data.name(), cell);
                }
            }
        }
        debug!(
            "Created view {} on table '{}': {} rows x {} columns",
            id,
            data.name(),
            grid.num_rows(),
            grid.num_columns()
        );
        let shared = Arc::new(ViewShared::new(id, config, engine, grid, data.generation()));
        lock(&self.shared.views).push(Arc::clone(&shared));
        Ok(LiveView::new(Arc::clone(&self.shared), shared))
    }

    pub fn num_views(&self) -> usize {
        lock(&self.shared.views).len()
    }

    pub fn size(&self) -> Result<usize> {
        self.check_alive()?;
        Ok(read(&self.shared.data).len())
    }

    pub fn schema(&self) -> Result<Schema> {
        self.check_alive()?;
        Ok(read(&self.shared.data).schema().clone())
    }

    pub fn columns(&self) -> Result<Vec<String>> {
        self.check_alive()?;
        Ok(read(&self.shared.data)
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    pub fn get_index(&self) -> Result<Option<String>> {
        self.check_alive()?;
        Ok(read(&self.shared.data).get_index().map(str::to_string))
    }

    pub fn to_records(&self) -> Result<Vec<Row>> {
        self.check_alive()?;
        Ok(read(&self.shared.data).to_records())
    }

    pub fn to_columns(&self) -> Result<Vec<(String, Vec<ColumnValue>)>> {
        self.check_alive()?;
        Ok(read(&self.shared.data).to_columns())
    }

    /// Run `f` against the table under a read lock.
    pub fn with_table<T>(&self, f: impl FnOnce(&Table) -> T) -> Result<T> {
        self.check_alive()?;
        Ok(f(&read(&self.shared.data)))
    }

    pub fn set_degraded_sink(&self, sink: Option<DegradedSink>) {
        *lock(&self.shared.degraded_sink) = sink;
    }

    /// Destroy the table and every view on it.
    pub fn delete(&self) -> Result<()> {
        let _writer = lock(&self.shared.writer);
        self.check_alive()?;
        self.shared.destroyed.store(true, Ordering::SeqCst);

        let views = std::mem::take(&mut *lock(&self.shared.views));
        for view in &views {
            view.deactivate();
        }
        debug!("Deleted table '{}' and {} views", self.name(), views.len());
        Ok(())
    }
}

impl std::fmt::Debug for LiveTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveTable")
            .field("name", &self.name())
            .field("views", &self.num_views())
            .field("deleted", &self.is_deleted())
            .finish()
    }
}
