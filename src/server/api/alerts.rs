// Alerts endpoints - CRUD for threshold alerts
//
// Evaluation and webhook delivery happen in the background scheduler; these
// handlers only manage definitions.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::server::auth::SessionProject;
use crate::server::AppState;
use crate::storage::meta::Alert;

use super::generate_id;

/// GET /api/v1/alerts
pub async fn list(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
) -> AppResult<Json<serde_json::Value>> {
    let alerts = state.meta.list_alerts(&project.id)?;
    Ok(Json(json!({"alerts": alerts})))
}

#[derive(Debug, Deserialize)]
pub struct CreateAlert {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub metric: String,
    #[serde(default)]
    pub event_name: String,
    #[serde(default)]
    pub threshold: i64,
    #[serde(default)]
    pub window_minutes: i64,
    #[serde(default)]
    pub webhook_url: String,
}

/// POST /api/v1/alerts — window defaults to 60 minutes.
pub async fn create(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Json(body): Json<CreateAlert>,
) -> AppResult<(StatusCode, Json<Alert>)> {
    if body.name.is_empty() || body.metric.is_empty() || body.webhook_url.is_empty() {
        return Err(AppError::Validation(
            "name, metric, and webhook_url are required".to_string(),
        ));
    }
    if !matches!(body.metric.as_str(), "error_count" | "pageview_count" | "event_count") {
        return Err(AppError::Validation("unknown metric".to_string()));
    }

    let alert = Alert {
        id: generate_id(),
        project_id: project.id.clone(),
        name: body.name,
        metric: body.metric,
        event_name: (!body.event_name.is_empty()).then_some(body.event_name),
        threshold: body.threshold,
        window_minutes: if body.window_minutes <= 0 { 60 } else { body.window_minutes },
        webhook_url: body.webhook_url,
        enabled: true,
        last_triggered_at: None,
        created_at: Utc::now(),
    };
    state.meta.create_alert(&alert)?;
    Ok((StatusCode::CREATED, Json(alert)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateAlert {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub threshold: i64,
    #[serde(default)]
    pub webhook_url: String,
}

/// PUT /api/v1/alerts/{id}
pub async fn update(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Path(id): Path<String>,
    Json(body): Json<UpdateAlert>,
) -> AppResult<Json<serde_json::Value>> {
    state
        .meta
        .update_alert(&project.id, &id, body.enabled, body.threshold, &body.webhook_url)?;
    Ok(Json(json!({"status": "ok"})))
}

/// DELETE /api/v1/alerts/{id}
pub async fn delete_one(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.meta.delete_alert(&project.id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
