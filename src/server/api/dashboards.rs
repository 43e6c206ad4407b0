// Dashboards endpoints - CRUD over opaque JSON configs

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::server::auth::SessionProject;
use crate::server::AppState;
use crate::storage::meta::Dashboard;

use super::generate_id;

/// GET /api/v1/dashboards
pub async fn list(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
) -> AppResult<Json<serde_json::Value>> {
    let dashboards = state.meta.list_dashboards(&project.id)?;
    Ok(Json(json!({"dashboards": dashboards})))
}

#[derive(Debug, Deserialize)]
pub struct DashboardBody {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_config")]
    pub config: serde_json::Value,
}

fn default_config() -> serde_json::Value {
    json!({})
}

/// POST /api/v1/dashboards
pub async fn create(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Json(body): Json<DashboardBody>,
) -> AppResult<(StatusCode, Json<Dashboard>)> {
    if body.name.is_empty() {
        return Err(AppError::Validation("name is required".to_string()));
    }
    let dashboard = state
        .meta
        .create_dashboard(&generate_id(), &project.id, &body.name, &body.config)?;
    Ok((StatusCode::CREATED, Json(dashboard)))
}

/// GET /api/v1/dashboards/{id}
pub async fn get_one(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Path(id): Path<String>,
) -> AppResult<Json<Dashboard>> {
    let dashboard = state
        .meta
        .get_dashboard(&project.id, &id)?
        .ok_or(AppError::NotFound("dashboard"))?;
    Ok(Json(dashboard))
}

/// PUT /api/v1/dashboards/{id}
pub async fn update(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Path(id): Path<String>,
    Json(body): Json<DashboardBody>,
) -> AppResult<Json<serde_json::Value>> {
    state
        .meta
        .get_dashboard(&project.id, &id)?
        .ok_or(AppError::NotFound("dashboard"))?;
    state
        .meta
        .update_dashboard(&project.id, &id, &body.name, &body.config)?;
    Ok(Json(json!({"status": "ok"})))
}

/// DELETE /api/v1/dashboards/{id}
pub async fn delete_one(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.meta.delete_dashboard(&project.id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
