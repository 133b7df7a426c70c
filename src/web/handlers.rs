use super::AppState;
use super::error::{Result, WebError};
use crate::domain::{TrackedObjectRecord, VisionState};
use crate::registry::put_with_retry;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

pub const CORRUPT_ROWS_HEADER: &str = "x-corrupt-rows";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct FindParams {
    pub name: Option<String>,
}

/// Body of a registration. Anything omitted is stored as its default; the
/// previous value under the same name is not merged.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RegisterObjectRequest {
    pub description: Option<String>,
    pub thumbnail_blob_name: String,
    pub spatial_anchor_id: String,
    pub vision_state: VisionState,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn count(State(state): State<AppState>) -> Result<Response> {
    let summary = state.queries.count_all_with_diagnostics().await?;

    let mut response = Json(summary.records).into_response();
    if summary.corrupt_rows > 0 {
        response.headers_mut().insert(
            HeaderName::from_static(CORRUPT_ROWS_HEADER),
            HeaderValue::from(summary.corrupt_rows),
        );
    }
    Ok(response)
}

pub async fn find(
    State(state): State<AppState>,
    Query(params): Query<FindParams>,
) -> Result<Json<TrackedObjectRecord>> {
    let name = params.name.unwrap_or_default();
    match state.queries.find_by_name(&name).await? {
        Some(record) => Ok(Json(record)),
        None => Err(WebError::NotFound(format!("no tracked object named '{}'", name))),
    }
}

pub async fn register(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<RegisterObjectRequest>,
) -> Result<Json<TrackedObjectRecord>> {
    let mut record = TrackedObjectRecord::new(name)?
        .with_thumbnail_blob_name(request.thumbnail_blob_name)
        .with_spatial_anchor_id(request.spatial_anchor_id)
        .with_vision_state(request.vision_state);
    record.description = request.description;

    put_with_retry(state.queries.store(), &record, &state.retry).await?;
    Ok(Json(record))
}
