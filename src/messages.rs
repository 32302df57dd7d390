/// WebSocket message types for client-server communication
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::config::ViewConfig;
use crate::delta::ViewDelta;
use crate::error::EngineError;
use crate::pivot::{ColumnSpec, Grid, RowKey, Viewport};
use crate::table::Schema;

/// Messages sent from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// List hosted tables
    ListTables,

    /// Request a table's schema
    Schema { table_name: String },

    /// Subscribe to a view of a table; an absent config is the identity view
    Subscribe {
        table_name: String,
        #[serde(default)]
        config: ViewConfig,
    },

    Unsubscribe { subscription: u64 },

    /// Upsert rows (one object or an array of objects)
    Update { table_name: String, rows: JsonValue },

    /// Remove rows by index value
    Remove { table_name: String, keys: Vec<JsonValue> },

    /// One-shot view snapshot, optionally cut to a viewport
    Query {
        table_name: String,
        #[serde(default)]
        config: ViewConfig,
        #[serde(default)]
        viewport: Option<Viewport>,
    },
}

/// A schema column on the wire
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    pub nullable: bool,
}

impl FieldSpec {
    pub fn from_schema(schema: &Schema) -> Vec<FieldSpec> {
        (0..schema.len())
            .filter_map(|i| schema.get_column_info(i))
            .map(|(name, column_type, nullable)| FieldSpec {
                name: name.to_string(),
                column_type: column_type.as_str().to_string(),
                nullable,
            })
            .collect()
    }
}

/// A cell that reads null because its aggregate failed
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct DegradedMarker {
    pub row: RowKey,
    pub column: String,
}

/// A grid snapshot on the wire. Rows are value arrays in `columns` order.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct GridPayload {
    pub columns: Vec<ColumnSpec>,
    pub keys: Vec<RowKey>,
    pub rows: Vec<Vec<JsonValue>>,
    pub degraded: Vec<DegradedMarker>,
}

impl From<&Grid> for GridPayload {
    fn from(grid: &Grid) -> Self {
        let (keys, rows): (Vec<RowKey>, Vec<Vec<JsonValue>>) = grid
            .rows()
            .map(|(key, values)| (key.clone(), values.iter().map(|v| v.to_json()).collect()))
            .unzip();
        let degraded = grid
            .degraded_cells()
            .into_iter()
            .map(|(row, column)| DegradedMarker { row, column })
            .collect();
        GridPayload {
            columns: grid.columns.clone(),
            keys,
            rows,
            degraded,
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Tables { names: Vec<String> },

    Schema {
        table_name: String,
        columns: Vec<FieldSpec>,
        index: Option<String>,
    },

    /// Subscription confirmed, with the grid later deltas apply to
    Snapshot {
        subscription: u64,
        table_name: String,
        grid: GridPayload,
    },

    Delta {
        subscription: u64,
        table_name: String,
        delta: ViewDelta,
    },

    /// Subscription released
    Unsubscribed { subscription: u64 },

    /// Rows written
    Updated {
        table_name: String,
        inserted: usize,
        updated: usize,
        removed: usize,
    },

    QueryResult { table_name: String, grid: GridPayload },

    /// Error occurred
    Error { message: String, kind: String },
}

impl ServerMessage {
    pub fn error(err: &EngineError) -> Self {
        ServerMessage::Error {
            message: err.to_string(),
            kind: err.kind().to_string(),
        }
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","message":"serialization failed: {}","kind":"state"}}"#, e)
        })
    }
}
