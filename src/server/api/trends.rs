// Trends endpoints - single-series and multi-series time buckets

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
pub struct TrendsQuery {
    pub interval: Option<String>,
    pub group_by: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// GET /api/v1/trends — time-series event counts. Default window 24h,
/// default interval hour.
pub async fn trends(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Query(params): Query<TrendsQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let interval = params.interval.as_deref().unwrap_or("hour");
    let (start, end) = resolve_days(params.start, params.end, 1);

    let points = state.events.query_trends(&project.id, interval, start, end)?;

    Ok(Json(json!({
        "data": points,
        "interval": interval,
        "start": start.to_rfc3339(),
        "end": end.to_rfc3339(),
    })))
}

/// GET /api/v1/trends/breakdown — up to 8 series split by a dimension
/// (event_name, event_type, or url_path).
pub async fn trends_breakdown(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Query(params): Query<TrendsQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let interval = params.interval.as_deref().unwrap_or("hour");
    let group_by = params.group_by.as_deref().unwrap_or("event_name");
    let (start, end) = resolve_days(params.start, params.end, 1);

    let series = state
        .events
        .query_trends_breakdown(&project.id, interval, group_by, start, end)?;

    Ok(Json(json!({
        "series": series,
        "interval": interval,
        "group_by": group_by,
    })))
}
