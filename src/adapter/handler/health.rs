use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use super::AppState;

pub async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// データベースを使っている場合は疎通を確認する。
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let Some(ref pool) = state.db_pool else {
        return (StatusCode::OK, Json(serde_json::json!({"status": "ready"})));
    };
    match sqlx::query("SELECT 1").execute(pool.as_ref()).await {
        Ok(_) => (StatusCode::OK, Json(serde_json::json!({"status": "ready"}))),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({"status": "not_ready", "database": "unreachable"})),
            )
        }
    }
}
