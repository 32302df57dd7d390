/// LivePivot WebSocket Server
///
/// Hosts a demo `trips` table fed by a synthetic ticker and serves live
/// pivot subscriptions over WebSocket.
use livepivot::server::{run_server, ServerConfig};
use livepivot::{ColumnType, ColumnValue, LiveTable, Manager, Row, Schema};
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;

const LINES: [&str; 4] = ["A", "C", "E", "L"];
const DIRECTIONS: [&str; 2] = ["N", "S"];
const ACTIVE_TRIPS: i64 = 40;

fn trips_table() -> livepivot::Result<LiveTable> {
    let schema = Schema::new(vec![
        ("trip_id".to_string(), ColumnType::Integer, false),
        ("line".to_string(), ColumnType::String, false),
        ("direction".to_string(), ColumnType::String, false),
        ("delay".to_string(), ColumnType::Float, true),
        ("stops_left".to_string(), ColumnType::Integer, true),
        ("updated_at".to_string(), ColumnType::DateTime, true),
    ]);
    LiveTable::new("trips", schema, Some("trip_id"))
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// One synthetic position report for `trip` at tick `tick`.
fn report(trip: i64, tick: i64) -> Row {
    let mix = (trip * 7919 + tick * 104_729) % 1000;
    Row::from([
        ("trip_id".to_string(), ColumnValue::Integer(trip)),
        ("line".to_string(), ColumnValue::from(LINES[(trip as usize) % LINES.len()])),
        ("direction".to_string(), ColumnValue::from(DIRECTIONS[(trip as usize / LINES.len()) % 2])),
        ("delay".to_string(), ColumnValue::Float(mix as f64 / 10.0 - 20.0)),
        ("stops_left".to_string(), ColumnValue::Integer(20 - (tick + trip) % 21)),
        ("updated_at".to_string(), ColumnValue::DateTime(now_ms())),
    ])
}

/// Feed ticker: every tick, a handful of trips report in and finished trips
/// are replaced.
fn spawn_feed(table: LiveTable, interval: Duration) {
    std::thread::spawn(move || {
        let mut tick: i64 = 0;
        loop {
            std::thread::sleep(interval);
            tick += 1;

            let batch: Vec<Row> = (0..5)
                .map(|i| (tick * 5 + i) % ACTIVE_TRIPS + (tick / 50) * ACTIVE_TRIPS)
                .map(|trip| report(trip, tick))
                .collect();
            if let Err(e) = table.update(batch) {
                error!("Feed update failed: {}", e);
                break;
            }

            if tick % 50 == 0 {
                let retired: Vec<ColumnValue> = (0..ACTIVE_TRIPS)
                    .map(|i| ColumnValue::Integer(i + (tick / 50 - 1) * ACTIVE_TRIPS))
                    .collect();
                if let Err(e) = table.remove(&retired) {
                    error!("Feed removal failed: {}", e);
                    break;
                }
            }
        }
    });
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = ServerConfig::from_env()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    let manager = Arc::new(Manager::new());
    let table = trips_table().map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    table
        .update((0..ACTIVE_TRIPS).map(|trip| report(trip, 0)).collect())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    manager
        .host_table("trips", table.clone())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    info!("Feeding 'trips' every {:?}", config.tick_interval);
    spawn_feed(table, config.tick_interval);

    run_server(&config, manager).await
}
