//! Descriptor listing and lookup endpoints.

use std::collections::BTreeSet;
use std::time::Instant;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};

use capsmith_types::descriptor::{Descriptor, DescriptorKind};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Query parameters for `GET /api/v1/descriptors`.
#[derive(Debug, Deserialize)]
pub struct DescriptorListQuery {
    pub tag: Option<String>,
    pub kind: Option<String>,
}

/// Response item for listing descriptors. The instruction body is left out.
#[derive(Debug, Serialize)]
pub(crate) struct DescriptorListItem {
    id: String,
    kind: DescriptorKind,
    name: String,
    description: String,
    version: String,
    tags: BTreeSet<String>,
    depends_on: Vec<String>,
    estimated_cost: f64,
}

impl From<&Descriptor> for DescriptorListItem {
    fn from(d: &Descriptor) -> Self {
        Self {
            id: d.id.clone(),
            kind: d.kind,
            name: d.name.clone(),
            description: d.description.clone(),
            version: d.version.to_string(),
            tags: d.tags.clone(),
            depends_on: d.depends_on.clone(),
            estimated_cost: d.estimated_cost,
        }
    }
}

/// GET /api/v1/descriptors - List descriptors, optionally by tag and kind.
pub async fn list_descriptors(
    State(state): State<AppState>,
    Query(query): Query<DescriptorListQuery>,
) -> Result<Json<ApiResponse<Vec<DescriptorListItem>>>, AppError> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();

    let kind = match &query.kind {
        Some(k) => Some(k.parse::<DescriptorKind>().map_err(AppError::Validation)?),
        None => None,
    };

    let items: Vec<DescriptorListItem> = state
        .engine
        .list(query.tag.as_deref(), kind)
        .iter()
        .map(|d| DescriptorListItem::from(d.as_ref()))
        .collect();

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(items, request_id, elapsed)
        .with_link("self", "/api/v1/descriptors");

    Ok(Json(resp))
}

/// GET /api/v1/descriptors/{id} - Full descriptor including its body.
pub async fn get_descriptor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Descriptor>>, AppError> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();

    let descriptor = state.engine.describe(&id)?;

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(Descriptor::clone(&descriptor), request_id, elapsed)
        .with_link("self", &format!("/api/v1/descriptors/{id}"))
        .with_link("collection", "/api/v1/descriptors");

    Ok(Json(resp))
}
