use std::future::IntoFuture;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use headcount::{
    create_router, init_pool, run_migrations, spawn_store_writer, store_channel, AppState, Clock,
    Config, DeviceRegistry, HttpDeviceClient, LogSink, OccupancyBoard, PollLoop,
    RotationScheduler, SqliteStore, SystemClock,
};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            eprintln!("Optional: HEADCOUNT_DEVICES (format: [user:password@]host,...)");
            eprintln!("Optional: HEADCOUNT_LISTEN_ADDR, DATABASE_URL, HEADCOUNT_LOG_DIR");
            eprintln!("Optional: HEADCOUNT_POLL_INTERVAL_MS, HEADCOUNT_FETCH_TIMEOUT_MS");
            eprintln!("Optional: HEADCOUNT_ROTATION_CHECK_SECS, HEADCOUNT_STORE_QUEUE");
            std::process::exit(1);
        }
    };

    tracing::info!("Starting headcount");
    tracing::info!("Listen address: {}", config.listen_addr);
    tracing::info!("Database: {}", config.database_url);
    tracing::info!("Log directory: {}", config.log_dir.display());

    // Connect to database
    let pool = match init_pool(&config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Database connection error: {}", e);
            std::process::exit(1);
        }
    };

    // Run migrations
    if let Err(e) = run_migrations(&pool).await {
        eprintln!("Migration error: {}", e);
        std::process::exit(1);
    }
    tracing::info!("Database migrations completed");

    let registry = match DeviceRegistry::with_devices(config.devices.clone()) {
        Ok(r) => Arc::new(r),
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!("Registered {} devices", registry.len());

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Store writer
    let (forwarder, rx) = store_channel(config.store_queue);
    let store = Arc::new(SqliteStore::new(pool.clone()));
    spawn_store_writer(store, rx);

    // Log sink
    let sink = match LogSink::open(&config.log_dir, registry.clone(), clock.clone(), forwarder) {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            eprintln!("Log error: {}", e);
            std::process::exit(1);
        }
    };

    let client = match HttpDeviceClient::new(config.fetch_timeout) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            eprintln!("HTTP client error: {}", e);
            std::process::exit(1);
        }
    };

    let board = Arc::new(OccupancyBoard::new());

    // Background loops
    let poller = PollLoop::new(
        registry.clone(),
        client,
        sink.clone(),
        board.clone(),
        clock.clone(),
        config.poll_interval,
        config.fetch_timeout,
    )
    .spawn();
    let mut rotation =
        RotationScheduler::new(sink.clone(), clock, config.rotation_check_interval).spawn();

    // Build router
    let state = AppState::new(pool, registry, sink, board);
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server running at http://{}", config.listen_addr);

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .into_future();

    let mut rotation_failed = false;
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        result = rotation.join() => {
            rotation_failed = true;
            match result {
                Ok(Err(e)) => tracing::error!("Stopping, log file unavailable: {}", e),
                Ok(Ok(())) => tracing::error!("Rotation scheduler ended unexpectedly"),
                Err(e) => tracing::error!("Rotation scheduler panicked: {}", e),
            }
        }
    }

    if let Err(e) = poller.stop().await {
        tracing::error!("Poll loop panicked: {}", e);
    }
    if rotation_failed {
        std::process::exit(1);
    }
    if let Err(e) = rotation.stop().await {
        tracing::error!("Rotation scheduler panicked: {}", e);
    }

    tracing::info!("Shut down");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
