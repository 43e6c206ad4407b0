// Event names endpoints - cache listing and user overrides

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::server::auth::SessionProject;
use crate::server::AppState;

/// GET /api/v1/names — all cached names for the project.
pub async fn list(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
) -> AppResult<Json<serde_json::Value>> {
    let names = state.meta.list_event_names(&project.id)?;
    Ok(Json(json!({"names": names})))
}

#[derive(Debug, Deserialize)]
pub struct OverrideBody {
    #[serde(default)]
    pub name: String,
}

/// PUT /api/v1/names/{fp} — set a user override. Overrides win over AI
/// names until explicitly cleared.
pub async fn override_name(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Path(fingerprint): Path<String>,
    Json(body): Json<OverrideBody>,
) -> AppResult<Json<serde_json::Value>> {
    if fingerprint.is_empty() {
        return Err(AppError::Validation("fingerprint required".to_string()));
    }
    if body.name.is_empty() {
        return Err(AppError::Validation("name is required".to_string()));
    }

    state
        .meta
        .override_event_name(&project.id, &fingerprint, &body.name)?;
    Ok(Json(json!({"status": "ok"})))
}
