// Heatmap endpoint - click density for one page

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
pub struct HeatmapQuery {
    #[serde(default)]
    pub url_path: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// GET /api/v1/heatmap — grouped normalized click coordinates.
pub async fn heatmap(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Query(params): Query<HeatmapQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let (start, end) = resolve_days(params.start, params.end, 7);
    let points = state
        .events
        .query_heatmap(&project.id, &params.url_path, start, end)?;
    Ok(Json(json!({"points": points})))
}
