use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::NaiveDateTime;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use headcount::{
    create_router, init_pool, run_migrations, AppState, Clock, Device, DeviceRegistry, LogSink,
    OccupancyBoard, StoreForwarder,
};

struct FixedClock(NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

struct TestApp {
    router: axum::Router,
    registry: Arc<DeviceRegistry>,
    sink: Arc<LogSink>,
    board: Arc<OccupancyBoard>,
    pool: sqlx::SqlitePool,
    _dir: TempDir,
}

/// Create a test app with in-memory database and a temporary log directory.
async fn create_test_app(devices: &[&str]) -> TestApp {
    let pool = init_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(
        DeviceRegistry::with_devices(devices.iter().map(|id| Device::new(*id))).unwrap(),
    );
    let clock = Arc::new(FixedClock(
        NaiveDateTime::parse_from_str("2024-03-01 08:30:00", "%Y-%m-%d %H:%M:%S").unwrap(),
    ));
    let sink = Arc::new(
        LogSink::open(dir.path(), registry.clone(), clock, StoreForwarder::detached()).unwrap(),
    );
    let board = Arc::new(OccupancyBoard::new());

    let state = AppState::new(pool.clone(), registry.clone(), sink.clone(), board.clone());
    TestApp {
        router: create_router(state),
        registry,
        sink,
        board,
        pool,
        _dir: dir,
    }
}

/// Helper to get response body as string.
async fn body_string(body: Body) -> String {
    let bytes = body.collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(body: Body) -> serde_json::Value {
    serde_json::from_str(&body_string(body).await).unwrap()
}

fn post_device(json: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/devices")
        .header("Content-Type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// ============================================================================
// Health endpoint tests
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app(&[]).await;

    let response = app.router.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response.into_body()).await, "OK");
}

// ============================================================================
// Device endpoint tests
// ============================================================================

#[tokio::test]
async fn test_list_devices() {
    let app = create_test_app(&["10.0.0.5", "10.0.0.6"]).await;

    let response = app.router.oneshot(get("/api/devices")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response.into_body()).await;
    let devices = json["devices"].as_array().unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0]["id"], "10.0.0.5");
    assert_eq!(devices[1]["id"], "10.0.0.6");
}

#[tokio::test]
async fn test_create_device() {
    let app = create_test_app(&["10.0.0.5"]).await;

    let response = app
        .router
        .oneshot(post_device(
            r#"{ "id": "10.0.0.7", "username": "admin", "password": "secret" }"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);

    let json = body_json(response.into_body()).await;
    assert_eq!(json["id"], "10.0.0.7");
    assert_eq!(json["username"], "admin");
    assert!(json.get("password").is_none());

    assert!(app.registry.contains("10.0.0.7"));
    let snapshot = app.registry.snapshot();
    assert_eq!(snapshot[1].password.as_deref(), Some("secret"));

    let log = std::fs::read_to_string(app.sink.current_path()).unwrap();
    assert!(log.starts_with("Camera IPs:\nCamera 1 = 10.0.0.5\n\n"));
    assert!(log.contains("08:30:00, Camera 2 = 10.0.0.7 added\n"));
}

#[tokio::test]
async fn test_create_device_duplicate() {
    let app = create_test_app(&["10.0.0.5"]).await;

    let response = app
        .router
        .oneshot(post_device(r#"{ "id": "10.0.0.5" }"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_string(response.into_body()).await;
    assert!(body.contains("already registered"));
    assert_eq!(app.registry.len(), 1);
}

#[tokio::test]
async fn test_create_device_empty_id() {
    let app = create_test_app(&[]).await;

    let response = app
        .router
        .oneshot(post_device(r#"{ "id": "   " }"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.registry.is_empty());
}

#[tokio::test]
async fn test_create_device_malformed_json() {
    let app = create_test_app(&[]).await;

    let response = app
        .router
        .oneshot(post_device(r#"{ "username": "admin" }"#))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_delete_device() {
    let app = create_test_app(&["10.0.0.5", "10.0.0.6"]).await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/devices/10.0.0.5")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!app.registry.contains("10.0.0.5"));

    // Removing again is not an error.
    let response = app
        .router
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/devices/10.0.0.5")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(app.registry.len(), 1);

    // The header of the active file is left alone.
    let log = std::fs::read_to_string(app.sink.current_path()).unwrap();
    assert!(log.contains("Camera 1 = 10.0.0.5"));
}

// ============================================================================
// Counts endpoint tests
// ============================================================================

#[tokio::test]
async fn test_get_counts_empty() {
    let app = create_test_app(&["10.0.0.5"]).await;

    let response = app.router.oneshot(get("/api/counts")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response.into_body()).await;
    assert_eq!(json["devices"].as_array().unwrap().len(), 0);
    assert_eq!(json["total_entered"], 0);
    assert_eq!(json["total_exited"], 0);
    assert_eq!(json["total_occupancy"], 0);
}

#[tokio::test]
async fn test_get_counts_totals() {
    let app = create_test_app(&["10.0.0.5", "10.0.0.6"]).await;
    let t = NaiveDateTime::parse_from_str("2024-03-01 08:31:00", "%Y-%m-%d %H:%M:%S").unwrap();
    app.board.update("10.0.0.5", 12, 5, t);
    app.board.update("10.0.0.6", 4, 4, t);

    let response = app.router.oneshot(get("/api/counts")).await.unwrap();
    let json = body_json(response.into_body()).await;

    let devices = json["devices"].as_array().unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0]["device_id"], "10.0.0.5");
    assert_eq!(devices[0]["occupancy"], 7);
    assert_eq!(json["total_entered"], 16);
    assert_eq!(json["total_exited"], 9);
    assert_eq!(json["total_occupancy"], 7);
}

// ============================================================================
// Log endpoint tests
// ============================================================================

#[tokio::test]
async fn test_get_log_empty() {
    let app = create_test_app(&[]).await;

    let response = app.router.oneshot(get("/api/log")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response.into_body()).await;
    assert_eq!(json["after_id"], 0);
    assert_eq!(json["limit"], 100);
    assert_eq!(json["max_id"], 0);
    assert_eq!(json["has_more"], false);
    assert_eq!(json["entries"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_get_log_pages() {
    let app = create_test_app(&["10.0.0.5"]).await;

    for i in 1..=3i64 {
        sqlx::query(
            "INSERT INTO occupancy_log (ts, device_id, kind, entered_total, exited_total, occupancy) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind("2024-03-01 08:30:00")
        .bind("10.0.0.5")
        .bind("entered")
        .bind(i)
        .bind(0i64)
        .bind(i)
        .execute(&app.pool)
        .await
        .unwrap();
    }

    let response = app
        .router
        .oneshot(get("/api/log?after_id=1&limit=1"))
        .await
        .unwrap();
    let json = body_json(response.into_body()).await;

    assert_eq!(json["max_id"], 2);
    assert_eq!(json["has_more"], true);
    let entries = json["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["entered_total"], 2);
    assert_eq!(entries[0]["kind"], "entered");
}
