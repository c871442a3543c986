use sqlx::SqlitePool;
use std::sync::Arc;

use crate::board::OccupancyBoard;
use crate::registry::DeviceRegistry;
use crate::sink::LogSink;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub registry: Arc<DeviceRegistry>,
    pub sink: Arc<LogSink>,
    pub board: Arc<OccupancyBoard>,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        registry: Arc<DeviceRegistry>,
        sink: Arc<LogSink>,
        board: Arc<OccupancyBoard>,
    ) -> Self {
        Self {
            pool,
            registry,
            sink,
            board,
        }
    }
}
