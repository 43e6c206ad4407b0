// Paths endpoint - page-to-page transition analysis

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::AppResult;
use crate::server::auth::SessionProject;
use crate::server::AppState;

use super::resolve_days;
use chrono::{DateTime, Utc};

#[derive(Debug, Deserialize)]
pub struct PathsQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// GET /api/v1/paths — most travelled pageview transitions.
pub async fn paths(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Query(params): Query<PathsQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let (start, end) = resolve_days(params.start, params.end, 7);
    let transitions = state
        .events
        .query_paths(&project.id, start, end, params.limit.unwrap_or(20))?;
    Ok(Json(json!({"transitions": transitions})))
}
