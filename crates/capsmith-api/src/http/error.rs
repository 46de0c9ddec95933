//! Application error type mapping to HTTP status codes and envelope format.

use axum::response::{IntoResponse, Response};
use serde_json::json;

use capsmith_types::error::{LoadError, NotFound, ResolutionError};

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    NotFound(NotFound),
    /// A request-level resolution failure.
    Resolution(ResolutionError),
    /// A reload failed; the previous snapshot is still served.
    Load(LoadError),
    Validation(String),
}

impl From<NotFound> for AppError {
    fn from(e: NotFound) -> Self {
        AppError::NotFound(e)
    }
}

impl From<ResolutionError> for AppError {
    fn from(e: ResolutionError) -> Self {
        AppError::Resolution(e)
    }
}

impl From<LoadError> for AppError {
    fn from(e: LoadError) -> Self {
        AppError::Load(e)
    }
}

impl AppError {
    fn parts(&self) -> (&'static str, String, Option<serde_json::Value>) {
        match self {
            AppError::NotFound(e) => ("NOT_FOUND", e.to_string(), Some(json!({ "id": e.0 }))),
            AppError::Resolution(e) => {
                let code = match e {
                    ResolutionError::CycleDetected { .. } => "CYCLE_DETECTED",
                    ResolutionError::BudgetExceeded { .. } => "BUDGET_EXCEEDED",
                    ResolutionError::UnresolvedDependency { .. } => "UNRESOLVED_DEPENDENCY",
                };
                let mut details = json!({ "offending": e.offending_ids() });
                if let ResolutionError::BudgetExceeded { budget, dropped } = e {
                    details["budget"] = json!(budget);
                    details["dropped"] = json!(dropped);
                }
                (code, e.to_string(), Some(details))
            }
            AppError::Load(e) => {
                let code = match e {
                    LoadError::Timeout(_) => "LOAD_TIMEOUT",
                    LoadError::Cancelled => "SHUTTING_DOWN",
                    _ => "LOAD_FAILED",
                };
                (code, e.to_string(), None)
            }
            AppError::Validation(msg) => ("VALIDATION_ERROR", msg.clone(), None),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (code, message, details) = self.parts();
        tracing::debug!(code, %message, "request failed");
        ApiResponse::error(code, message, details, String::new(), 0).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use capsmith_types::plan::{DropReason, DroppedCandidate};

    #[test]
    fn test_resolution_errors_are_unprocessable() {
        let err = AppError::from(ResolutionError::UnresolvedDependency {
            dependent: "review".to_owned(),
            missing: "lint".to_owned(),
        });
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_budget_error_details_list_dropped() {
        let err = AppError::from(ResolutionError::BudgetExceeded {
            budget: 1.0,
            dropped: vec![DroppedCandidate {
                id: "b".to_owned(),
                reason: DropReason::BudgetExceeded {
                    required: 3.0,
                    remaining: 1.0,
                },
                cascaded: vec!["a".to_owned()],
            }],
        });
        let (code, _, details) = err.parts();
        let details = details.unwrap();
        assert_eq!(code, "BUDGET_EXCEEDED");
        assert_eq!(details["offending"], json!(["b", "a"]));
        assert_eq!(details["dropped"][0]["reason"]["type"], "budget_exceeded");
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let err = AppError::from(NotFound("nope".to_owned()));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_reload_timeout_maps_to_gateway_timeout() {
        let err = AppError::from(LoadError::Timeout(std::time::Duration::from_secs(1)));
        assert_eq!(err.into_response().status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
