pub mod board;
pub mod client;
pub mod clock;
pub mod config;
pub mod db;
pub mod detector;
pub mod error;
pub mod models;
pub mod poller;
pub mod registry;
pub mod rotation;
pub mod routes;
pub mod sink;
pub mod state;
pub mod store;

pub use board::OccupancyBoard;
pub use client::{Counts, DeviceClient, HttpDeviceClient};
pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use db::{init_pool, run_migrations, SqliteStore};
pub use detector::DeltaDetector;
pub use error::{FetchError, RegistryError, SinkError, SinkOpenError, StoreError};
pub use models::{Device, DeviceState, EventKind, LogRecord};
pub use poller::{PollLoop, PollState, PollerHandle, TickStats};
pub use registry::DeviceRegistry;
pub use rotation::{RotationHandle, RotationScheduler};
pub use routes::create_router;
pub use sink::LogSink;
pub use state::AppState;
pub use store::{spawn_store_writer, store_channel, RecordStore, StoreForwarder};
