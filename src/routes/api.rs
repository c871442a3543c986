use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::db;
use crate::models::{GetCountsResponse, GetLogResponse, LogQuery};
use crate::state::AppState;

/// GET /api/counts - Latest counts per registered device and their totals.
pub async fn get_counts(State(state): State<AppState>) -> Json<GetCountsResponse> {
    Json(state.board.summary(&state.registry.snapshot()))
}

/// GET /api/log?after_id=...&limit=... - Persisted occupancy records.
pub async fn get_log(State(state): State<AppState>, Query(query): Query<LogQuery>) -> Response {
    match db::get_log_after(&state.pool, query.after_id, query.limit).await {
        Ok((entries, max_id, has_more)) => {
            let response = GetLogResponse {
                after_id: query.after_id,
                limit: query.limit,
                max_id,
                has_more,
                entries,
            };
            Json(response).into_response()
        }
        Err(e) => {
            tracing::error!("Failed to get log: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", e),
            )
                .into_response()
        }
    }
}
