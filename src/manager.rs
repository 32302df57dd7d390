//! Session manager
//!
//! Hosts named tables and fans view deltas out to client connections. Each
//! client owns one unbounded channel; a subscription is a (table, view
//! definition) pair, and every client subscribing to the same pair shares a
//! single `LiveView`. When its last subscriber leaves the shared view is
//! dropped, which unregisters it from the table.

use crate::changeset::RowDelta;
use crate::column::ColumnValue;
use crate::config::ViewConfig;
use crate::delta::ViewDelta;
use crate::error::{EngineError, Result};
use crate::live::{lock, LiveTable};
use crate::pivot::{DegradedCell, Grid, Viewport};
use crate::table::{Row, Schema};
use crate::view::LiveView;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

pub type ClientId = u64;
pub type SubscriptionId = u64;

/// A delta addressed to one subscription of a client.
#[derive(Debug, Clone)]
pub struct ViewEvent {
    pub subscription: SubscriptionId,
    pub table_name: String,
    pub delta: Arc<ViewDelta>,
}

/// (table name, canonical view definition)
type ViewKey = (String, String);

struct SharedView {
    view: LiveView,
    subscriptions: HashSet<SubscriptionId>,
}

struct Subscription {
    key: ViewKey,
    /// Callback id registered on the shared view
    callback: u64,
}

struct Client {
    sender: UnboundedSender<ViewEvent>,
    subscriptions: HashMap<SubscriptionId, Subscription>,
}

#[derive(Default)]
struct ManagerState {
    tables: HashMap<String, LiveTable>,
    views: HashMap<ViewKey, SharedView>,
    clients: HashMap<ClientId, Client>,
}

/// Registry of hosted tables and client subscriptions.
///
/// ```
/// use livepivot::{LiveTable, Manager, ViewConfig};
///
/// let manager = Manager::new();
/// let table = LiveTable::from_json("t", r#"[{"id": 1, "x": 2}]"#, Some("id")).unwrap();
/// manager.host_table("t", table).unwrap();
///
/// let (client, mut events) = manager.connect();
/// let (_sub, grid) = manager.subscribe(client, "t", ViewConfig::default()).unwrap();
/// assert_eq!(grid.num_rows(), 1);
///
/// manager.update_json("t", &serde_json::json!({"id": 2, "x": 5})).unwrap();
/// let event = events.try_recv().unwrap();
/// assert_eq!(event.table_name, "t");
/// assert!(!event.delta.is_empty());
/// ```
pub struct Manager {
    state: Mutex<ManagerState>,
    next_id: AtomicU64,
    degraded: Arc<AtomicU64>,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl Manager {
    pub fn new() -> Self {
        Manager {
            state: Mutex::new(ManagerState::default()),
            next_id: AtomicU64::new(1),
            degraded: Arc::new(AtomicU64::new(0)),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Host `table` under `name`. Names are unique per manager.
    pub fn host_table(&self, name: &str, table: LiveTable) -> Result<()> {
        let mut state = lock(&self.state);
        if state.tables.contains_key(name) {
            return Err(EngineError::State(format!("Table '{}' is already hosted", name)));
        }

        let counter = Arc::clone(&self.degraded);
        table.set_degraded_sink(Some(Arc::new(move |table: &str, cell: &DegradedCell| {
            counter.fetch_add(1, Ordering::Relaxed);
            warn!("Table '{}': cell {:?} / '{}' degraded: {}", table, cell.row, cell.column, cell.message);
        })));

        info!("Hosting table '{}'", name);
        state.tables.insert(name.to_string(), table);
        Ok(())
    }

    pub fn get_table(&self, name: &str) -> Result<LiveTable> {
        lock(&self.state)
            .tables
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::State(format!("No hosted table named '{}'", name)))
    }

    /// Hosted table names, sorted.
    pub fn get_hosted_table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.state).tables.keys().cloned().collect();
        names.sort();
        names
    }

    /// Stop hosting `name` and delete the table with every view on it.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        let table = {
            let mut state = lock(&self.state);
            let table = state
                .tables
                .remove(name)
                .ok_or_else(|| EngineError::State(format!("No hosted table named '{}'", name)))?;
            state.views.retain(|(table_name, _), _| table_name != name);
            for client in state.clients.values_mut() {
                client.subscriptions.retain(|_, sub| sub.key.0 != name);
            }
            table
        };
        info!("Dropped table '{}'", name);
        table.delete()
    }

    /// Open a client connection. Deltas for all of its subscriptions arrive
    /// on the returned receiver.
    pub fn connect(&self) -> (ClientId, UnboundedReceiver<ViewEvent>) {
        let (sender, receiver) = unbounded_channel();
        let id = self.next_id();
        lock(&self.state).clients.insert(
            id,
            Client {
                sender,
                subscriptions: HashMap::new(),
            },
        );
        debug!("Client {} connected", id);
        (id, receiver)
    }

    /// Release every subscription of `client`.
    pub fn disconnect(&self, client: ClientId) {
        let mut state = lock(&self.state);
        if let Some(removed) = state.clients.remove(&client) {
            for (id, sub) in removed.subscriptions {
                release(&mut state, id, sub);
            }
            debug!("Client {} disconnected", client);
        }
    }

    /// Subscribe `client` to a view of `table_name`. Returns the subscription
    /// id and the snapshot that the following deltas apply to.
    pub fn subscribe(&self, client: ClientId, table_name: &str, config: ViewConfig) -> Result<(SubscriptionId, Grid)> {
        let mut state = lock(&self.state);
        let sender = state
            .clients
            .get(&client)
            .map(|c| c.sender.clone())
            .ok_or_else(|| EngineError::State(format!("Unknown client {}", client)))?;
        let table = state
            .tables
            .get(table_name)
            .cloned()
            .ok_or_else(|| EngineError::State(format!("No hosted table named '{}'", table_name)))?;

        let key: ViewKey = (table_name.to_string(), config.canonical_key());
        if !state.views.contains_key(&key) {
            let view = table.view(config)?;
            debug!("Shared view {} created for table '{}'", view.id(), table_name);
            state.views.insert(
                key.clone(),
                SharedView {
                    view,
                    subscriptions: HashSet::new(),
                },
            );
        }

        let id = self.next_id();
        let name = table_name.to_string();
        let shared = state
            .views
            .get_mut(&key)
            .ok_or_else(|| EngineError::State("Shared view vanished".to_string()))?;
        let (grid, callback) = shared.view.subscribe_with(move |delta| {
            sender
                .send(ViewEvent {
                    subscription: id,
                    table_name: name.clone(),
                    delta: Arc::clone(delta),
                })
                .is_ok()
        })?;
        shared.subscriptions.insert(id);

        if let Some(c) = state.clients.get_mut(&client) {
            c.subscriptions.insert(id, Subscription { key, callback });
        }
        Ok((id, grid))
    }

    pub fn unsubscribe(&self, client: ClientId, subscription: SubscriptionId) -> Result<()> {
        let mut state = lock(&self.state);
        let sub = state
            .clients
            .get_mut(&client)
            .and_then(|c| c.subscriptions.remove(&subscription))
            .ok_or_else(|| {
                EngineError::State(format!("Unknown subscription {} for client {}", subscription, client))
            })?;
        release(&mut state, subscription, sub);
        Ok(())
    }

    pub fn update(&self, table_name: &str, rows: Vec<Row>) -> Result<RowDelta> {
        self.get_table(table_name)?.update(rows)
    }

    pub fn update_json(&self, table_name: &str, rows: &serde_json::Value) -> Result<RowDelta> {
        self.get_table(table_name)?.update_json(rows)
    }

    pub fn remove(&self, table_name: &str, keys: &[ColumnValue]) -> Result<RowDelta> {
        self.get_table(table_name)?.remove(keys)
    }

    /// Build a view once and return its grid without registering anything.
    pub fn query(&self, table_name: &str, config: ViewConfig) -> Result<Grid> {
        let view = self.get_table(table_name)?.view(config)?;
        view.snapshot()
    }

    /// Like `query`, keeping only the rows and columns inside `viewport`.
    pub fn query_window(&self, table_name: &str, config: ViewConfig, viewport: &Viewport) -> Result<Grid> {
        let view = self.get_table(table_name)?.view(config)?;
        view.snapshot_window(viewport)
    }

    pub fn schema(&self, table_name: &str) -> Result<Schema> {
        self.get_table(table_name)?.schema()
    }

    /// Degraded cells reported by hosted tables so far.
    pub fn degraded_count(&self) -> u64 {
        self.degraded.load(Ordering::Relaxed)
    }

    pub fn num_clients(&self) -> usize {
        lock(&self.state).clients.len()
    }

    /// Shared views currently materialized.
    pub fn num_views(&self) -> usize {
        lock(&self.state).views.len()
    }
}

fn release(state: &mut ManagerState, id: SubscriptionId, sub: Subscription) {
    let now_unused = match state.views.get_mut(&sub.key) {
        Some(shared) => {
            shared.view.remove_update(sub.callback);
            shared.subscriptions.remove(&id);
            shared.subscriptions.is_empty()
        }
        None => false,
    };
    if now_unused {
        if let Some(shared) = state.views.remove(&sub.key) {
            debug!("Shared view {} on '{}' released", shared.view.id(), sub.key.0);
        }
    }
}
