/// HTTP server with WebSocket support for live pivot subscriptions
use actix_web::{middleware, web, App, Error, HttpRequest, HttpResponse, HttpServer};
use actix_web_actors::ws;
use log::info;
use std::sync::Arc;
use std::time::Duration;

use crate::manager::Manager;
use crate::websocket::{AppState, PivotWebSocket};

/// Server settings
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Interval of the demo feed ticker
    pub tick_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            tick_interval: Duration::from_millis(500),
        }
    }
}

impl ServerConfig {
    /// Read `HOST`, `PORT` and `LIVEPIVOT_TICK_MS`, falling back to defaults.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ServerConfig::default();
        if let Some(host) = lookup("HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("PORT") {
            config.port = port.parse().map_err(|_| format!("PORT must be a number, got '{}'", port))?;
        }
        if let Some(ms) = lookup("LIVEPIVOT_TICK_MS") {
            let ms: u64 = ms
                .parse()
                .map_err(|_| format!("LIVEPIVOT_TICK_MS must be a number, got '{}'", ms))?;
            config.tick_interval = Duration::from_millis(ms);
        }
        Ok(config)
    }
}

/// WebSocket endpoint handler
async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let resp = ws::start(PivotWebSocket::new(state), &req, stream)?;
    Ok(resp)
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "tables": state.manager.get_hosted_table_names(),
        "clients": state.manager.num_clients(),
        "views": state.manager.num_views(),
        "degraded_cells": state.manager.degraded_count(),
    }))
}

/// Start the HTTP server with WebSocket support
pub async fn run_server(config: &ServerConfig, manager: Arc<Manager>) -> std::io::Result<()> {
    let state = web::Data::new(AppState::new(manager));

    info!("WebSocket: ws://{}:{}/ws", config.host, config.port);
    info!("Health check: http://{}:{}/health", config.host, config.port);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .wrap(
                actix_cors::Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .route("/ws", web::get().to(ws_index))
            .route("/health", web::get().to(health_check))
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
