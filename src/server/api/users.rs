// Users endpoints - aggregated profiles and per-user timelines

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::server::auth::SessionProject;
use crate::server::AppState;
use crate::storage::EventFilter;

use super::resolve_days;
use chrono::{DateTime, Utc};

#[derive(Debug, Deserialize)]
pub struct UsersQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// GET /api/v1/users — user profiles grouped by distinct id, most recently
/// active first, with the total distinct count for pagination.
pub async fn list_users(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Query(params): Query<UsersQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let (start, end) = resolve_days(params.start, params.end, 30);
    let (users, total) = state.events.query_users(
        &project.id,
        params.limit.unwrap_or(50),
        params.offset.unwrap_or(0),
        Some(start),
        Some(end),
    )?;
    Ok(Json(json!({"users": users, "total": total})))
}

#[derive(Debug, Deserialize)]
pub struct UserEventsQuery {
    pub limit: Option<usize>,
}

/// GET /api/v1/users/{id}/events — event timeline for one distinct id.
pub async fn user_events(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Path(distinct_id): Path<String>,
    Query(params): Query<UserEventsQuery>,
) -> AppResult<Json<serde_json::Value>> {
    if distinct_id.is_empty() {
        return Err(AppError::Validation("user id required".to_string()));
    }

    let events = state.events.query_events(&EventFilter {
        project_id: project.id.clone(),
        distinct_id: Some(distinct_id),
        limit: Some(params.limit.unwrap_or(100)),
        ..Default::default()
    })?;

    Ok(Json(json!({"events": events, "count": events.len()})))
}
