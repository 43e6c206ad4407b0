// Funnels endpoints - CRUD plus results and cohort breakdowns

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::server::auth::SessionProject;
use crate::server::AppState;
use crate::storage::meta::Funnel;
use crate::storage::FunnelStep;

use super::{generate_id, TimeRange};

/// GET /api/v1/funnels
pub async fn list(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
) -> AppResult<Json<serde_json::Value>> {
    let funnels = state.meta.list_funnels(&project.id)?;
    Ok(Json(json!({"funnels": funnels})))
}

#[derive(Debug, Deserialize)]
pub struct CreateFunnel {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub steps: Vec<FunnelStep>,
}

/// POST /api/v1/funnels — requires a name and at least two steps.
pub async fn create(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Json(body): Json<CreateFunnel>,
) -> AppResult<(StatusCode, Json<Funnel>)> {
    if body.name.is_empty() || body.steps.len() < 2 {
        return Err(AppError::Validation(
            "name and at least 2 steps required".to_string(),
        ));
    }

    let funnel = state
        .meta
        .create_funnel(&generate_id(), &project.id, &body.name, &body.steps)?;
    Ok((StatusCode::CREATED, Json(funnel)))
}

/// GET /api/v1/funnels/{id}
pub async fn get_one(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Path(id): Path<String>,
) -> AppResult<Json<Funnel>> {
    let funnel = state
        .meta
        .get_funnel(&project.id, &id)?
        .ok_or(AppError::NotFound("funnel"))?;
    Ok(Json(funnel))
}

/// DELETE /api/v1/funnels/{id}
pub async fn delete_one(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    state.meta.delete_funnel(&project.id, &id)?;
    Ok(Json(json!({"status": "ok"})))
}

/// GET /api/v1/funnels/{id}/results — step counts over the window
/// (default 30 days).
pub async fn results(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Path(id): Path<String>,
    Query(range): Query<TimeRange>,
) -> AppResult<Json<serde_json::Value>> {
    let funnel = state
        .meta
        .get_funnel(&project.id, &id)?
        .ok_or(AppError::NotFound("funnel"))?;

    let (start, end) = range.resolve_days(30);
    let results = state
        .events
        .query_funnel(&project.id, &funnel.steps, Some(start), Some(end))?;
    Ok(Json(json!({"results": results})))
}

#[derive(Debug, Deserialize)]
pub struct CohortsQuery {
    pub interval: Option<String>,
    pub start: Option<chrono::DateTime<chrono::Utc>>,
    pub end: Option<chrono::DateTime<chrono::Utc>>,
}

/// GET /api/v1/funnels/{id}/cohorts — step counts per session cohort.
pub async fn cohorts(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Path(id): Path<String>,
    Query(params): Query<CohortsQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let funnel = state
        .meta
        .get_funnel(&project.id, &id)?
        .ok_or(AppError::NotFound("funnel"))?;

    let interval = params.interval.as_deref().unwrap_or("week");
    let (start, end) = super::resolve_days(params.start, params.end, 30);
    let cohorts = state.events.query_funnel_cohorts(
        &project.id,
        &funnel.steps,
        interval,
        Some(start),
        Some(end),
    )?;
    Ok(Json(json!({"cohorts": cohorts})))
}
