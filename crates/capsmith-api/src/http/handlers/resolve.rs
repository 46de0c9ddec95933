//! Resolution endpoint.

use std::time::Instant;

use axum::Json;
use axum::extract::State;
use serde::Deserialize;

use capsmith_types::plan::{ActivationPlan, TaskContext};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Request body for `POST /api/v1/resolve`.
#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub explicit_ids: Vec<String>,
    /// Overrides the configured default budget.
    #[serde(default)]
    pub budget: Option<f64>,
}

impl ResolveRequest {
    fn into_context(self) -> Result<TaskContext, AppError> {
        if let Some(budget) = self.budget {
            if !budget.is_finite() || budget < 0.0 {
                return Err(AppError::Validation(format!(
                    "budget must be a non-negative number, got {budget}"
                )));
            }
        }
        Ok(TaskContext {
            text: self.text,
            explicit_ids: self.explicit_ids,
            budget: self.budget,
        })
    }
}

/// POST /api/v1/resolve - Match and resolve a task into an activation plan.
pub async fn resolve(
    State(state): State<AppState>,
    Json(body): Json<ResolveRequest>,
) -> Result<Json<ApiResponse<ActivationPlan>>, AppError> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();

    let context = body.into_context()?;
    let plan = state.engine.resolve(&context)?;

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(plan, request_id, elapsed).with_link("self", "/api/v1/resolve");

    Ok(Json(resp))
}
