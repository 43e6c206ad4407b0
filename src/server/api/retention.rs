// Retention endpoint - cohort retention matrix

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
pub struct RetentionQuery {
    pub interval: Option<String>,
    pub periods: Option<usize>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// GET /api/v1/retention — one row per cohort with per-period distinct
/// user counts. Default: weekly cohorts, 8 periods, 90-day window.
pub async fn retention(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Query(params): Query<RetentionQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let interval = params.interval.as_deref().unwrap_or("week");
    let periods = params.periods.unwrap_or(8);
    let (start, end) = resolve_days(params.start, params.end, 90);

    let cohorts = state
        .events
        .query_retention(&project.id, interval, periods, start, end)?;
    Ok(Json(json!({"cohorts": cohorts})))
}
