//! Administrative endpoints.

use std::time::Instant;

use axum::Json;
use axum::extract::State;

use capsmith_core::registry::shared::ReloadSummary;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// POST /api/v1/admin/reload - Rebuild the registry from the content root.
///
/// On failure the previous snapshot keeps serving and the load error is
/// returned.
pub async fn reload(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<ReloadSummary>>, AppError> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();

    let summary = state.engine.reload(&state.source, &state.shutdown).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(summary, request_id, elapsed)
        .with_link("self", "/api/v1/admin/reload")
        .with_link("descriptors", "/api/v1/descriptors");

    Ok(Json(resp))
}
