// Properties endpoints - JSON property key and value enumeration

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::server::auth::SessionProject;
use crate::server::AppState;

/// GET /api/v1/properties/keys — distinct top-level property keys.
pub async fn keys(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
) -> AppResult<Json<serde_json::Value>> {
    let keys = state.events.query_property_keys(&project.id)?;
    Ok(Json(json!({"keys": keys})))
}

#[derive(Debug, Deserialize)]
pub struct ValuesQuery {
    #[serde(default)]
    pub key: String,
}

/// GET /api/v1/properties/values?key=... — distinct values for one key.
pub async fn values(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Query(params): Query<ValuesQuery>,
) -> AppResult<Json<serde_json::Value>> {
    if params.key.is_empty() {
        return Err(AppError::Validation("key parameter required".to_string()));
    }
    let values = state.events.query_property_values(&project.id, &params.key, 100)?;
    Ok(Json(json!({"values": values})))
}
