// Pages endpoint - top pages by pageview traffic

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
pub struct PagesQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// GET /api/v1/pages — top pages with views and distinct sessions.
pub async fn top_pages(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Query(params): Query<PagesQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let (start, end) = resolve_days(params.start, params.end, 30);
    let pages = state
        .events
        .query_top_pages(&project.id, start, end, params.limit.unwrap_or(50))?;
    Ok(Json(json!({"pages": pages})))
}
