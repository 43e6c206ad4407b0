// Ingestion endpoint - POST /api/v1/events (API-key auth)
//
// Validates the batch, writes it in one transaction, then queues a naming
// job for every non-pageview event. Validation is all-or-nothing; no
// partial accept.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::ingest::{validate_payload, IngestPayload};
use crate::naming::NamingJob;
use crate::server::auth::ApiKeyProject;
use crate::server::AppState;

pub async fn ingest(
    State(state): State<AppState>,
    ApiKeyProject(project): ApiKeyProject,
    headers: HeaderMap,
    Json(mut payload): Json<IngestPayload>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    validate_payload(&mut payload).map_err(|e| AppError::Validation(e.to_string()))?;

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let records: Vec<_> = payload
        .events
        .iter()
        .map(|e| e.to_record(&project.id, &payload, user_agent))
        .collect();

    state.events.insert_events(&records)?;

    // Interaction events get naming jobs; pageviews don't need names.
    for (event, record) in payload.events.iter().zip(&records) {
        if event.event_type == "pageview" {
            continue;
        }
        state.namer.submit(NamingJob {
            project_id: project.id.clone(),
            fingerprint: record.fingerprint.clone(),
            request: event.to_naming_request(),
        });
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({"status": "ok", "accepted": records.len()})),
    ))
}
