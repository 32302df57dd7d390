/// WebSocket session actor bridging clients to the `Manager`
use actix::prelude::*;
use actix_web_actors::ws;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::column::ColumnValue;
use crate::error::{EngineError, Result};
use crate::manager::{ClientId, Manager, ViewEvent};
use crate::messages::{ClientMessage, FieldSpec, GridPayload, ServerMessage};

/// How often heartbeat pings are sent
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// How long before lack of client response causes a timeout
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared state for all WebSocket connections
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<Manager>,
}

impl AppState {
    pub fn new(manager: Arc<Manager>) -> Self {
        Self { manager }
    }
}

/// A view delta routed from the dispatch task to its session
#[derive(Message)]
#[rtype(result = "()")]
struct Dispatch(ViewEvent);

/// WebSocket connection actor
pub struct PivotWebSocket {
    hb: Instant,
    state: actix_web::web::Data<AppState>,
    client: Option<ClientId>,
}

impl PivotWebSocket {
    pub fn new(state: actix_web::web::Data<AppState>) -> Self {
        Self {
            hb: Instant::now(),
            state,
            client: None,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                warn!("WebSocket client {:?} heartbeat failed, disconnecting", act.client);
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn send(ctx: &mut ws::WebsocketContext<Self>, msg: &ServerMessage) {
        ctx.text(msg.to_json_string());
    }

    fn client(&self) -> Result<ClientId> {
        self.client
            .ok_or_else(|| EngineError::State("Connection is not registered".to_string()))
    }

    fn handle_client_message(&mut self, msg: ClientMessage) -> Result<ServerMessage> {
        let manager = &self.state.manager;
        match msg {
            ClientMessage::ListTables => Ok(ServerMessage::Tables {
                names: manager.get_hosted_table_names(),
            }),

            ClientMessage::Schema { table_name } => {
                let table = manager.get_table(&table_name)?;
                Ok(ServerMessage::Schema {
                    columns: FieldSpec::from_schema(&table.schema()?),
                    index: table.get_index()?,
                    table_name,
                })
            }

            ClientMessage::Subscribe { table_name, config } => {
                let (subscription, grid) = manager.subscribe(self.client()?, &table_name, config)?;
                Ok(ServerMessage::Snapshot {
                    subscription,
                    grid: GridPayload::from(&grid),
                    table_name,
                })
            }

            ClientMessage::Unsubscribe { subscription } => {
                manager.unsubscribe(self.client()?, subscription)?;
                Ok(ServerMessage::Unsubscribed { subscription })
            }

            ClientMessage::Update { table_name, rows } => {
                let change = manager.update_json(&table_name, &rows)?;
                Ok(ServerMessage::Updated {
                    table_name,
                    inserted: change.inserted_count(),
                    updated: change.updated_count(),
                    removed: change.removed_count(),
                })
            }

            ClientMessage::Remove { table_name, keys } => {
                let keys = keys
                    .iter()
                    .map(ColumnValue::from_json)
                    .collect::<std::result::Result<Vec<_>, String>>()
                    .map_err(EngineError::Validation)?;
                let change = manager.remove(&table_name, &keys)?;
                Ok(ServerMessage::Updated {
                    table_name,
                    inserted: 0,
                    updated: 0,
                    removed: change.removed_count(),
                })
            }

            ClientMessage::Query { table_name, config, viewport } => {
                let grid = match viewport {
                    Some(viewport) => manager.query_window(&table_name, config, &viewport)?,
                    None => manager.query(&table_name, config)?,
                };
                Ok(ServerMessage::QueryResult {
                    grid: GridPayload::from(&grid),
                    table_name,
                })
            }
        }
    }
}

impl Actor for PivotWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hb(ctx);

        let (client, mut events) = self.state.manager.connect();
        self.client = Some(client);
        info!("WebSocket client {} connected", client);

        // Dispatch task: drains the client's channel into the session
        let addr = ctx.address();
        actix::spawn(async move {
            while let Some(event) = events.recv().await {
                if !addr.connected() {
                    break;
                }
                addr.do_send(Dispatch(event));
            }
            debug!("Dispatch task for client {} finished", client);
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(client) = self.client.take() {
            self.state.manager.disconnect(client);
            info!("WebSocket client {} disconnected", client);
        }
    }
}

impl StreamHandler<std::result::Result<ws::Message, ws::ProtocolError>> for PivotWebSocket {
    fn handle(&mut self, msg: std::result::Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                let response = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => self
                        .handle_client_message(client_msg)
                        .unwrap_or_else(|e| ServerMessage::error(&e)),
                    Err(e) => ServerMessage::Error {
                        message: format!("Invalid message format: {}", e),
                        kind: "validation".to_string(),
                    },
                };
                Self::send(ctx, &response);
            }
            Ok(ws::Message::Binary(_)) => {
                warn!("Unexpected binary message from client {:?}", self.client);
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            _ => ctx.stop(),
        }
    }
}

impl Handler<Dispatch> for PivotWebSocket {
    type Result = ();

    fn handle(&mut self, msg: Dispatch, ctx: &mut Self::Context) {
        let ViewEvent {
            subscription,
            table_name,
            delta,
        } = msg.0;
        let response = ServerMessage::Delta {
            subscription,
            table_name,
            delta: delta.as_ref().clone(),
        };
        Self::send(ctx, &response);
    }
}
