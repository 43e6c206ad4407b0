// Sessions endpoints - grouped listing and per-session timeline
//
// The listing fetches up to 10,000 recent events and groups them in memory,
// preserving first-seen order. Over very long ranges this truncates; that
// is accepted behavior for the dashboard's recency-oriented view.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::server::auth::SessionProject;
use crate::server::AppState;
use crate::storage::EventFilter;

use super::resolve_days;

const SESSION_SCAN_LIMIT: usize = 10_000;

#[derive(Debug, Deserialize)]
pub struct SessionsQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize)]
struct SessionSummary {
    session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    distinct_id: Option<String>,
    event_count: usize,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    entry_url: String,
}

/// GET /api/v1/sessions — recent sessions with first/last activity and
/// entry URL.
pub async fn list_sessions(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Query(params): Query<SessionsQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let (start, end) = resolve_days(params.start, params.end, 7);
    let limit = params.limit.unwrap_or(50);
    let offset = params.offset.unwrap_or(0);

    let events = state.events.query_events(&EventFilter {
        project_id: project.id.clone(),
        start: Some(start),
        end: Some(end),
        limit: Some(SESSION_SCAN_LIMIT),
        ..Default::default()
    })?;

    let mut sessions: Vec<SessionSummary> = Vec::new();
    let mut index: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    for event in events {
        let idx = match index.get(&event.session_id) {
            Some(&idx) => idx,
            None => {
                index.insert(event.session_id.clone(), sessions.len());
                sessions.push(SessionSummary {
                    session_id: event.session_id.clone(),
                    distinct_id: event.distinct_id.clone(),
                    event_count: 0,
                    first_seen: event.timestamp,
                    last_seen: event.timestamp,
                    entry_url: event.url.clone(),
                });
                sessions.len() - 1
            }
        };

        let session = &mut sessions[idx];
        session.event_count += 1;
        if event.timestamp < session.first_seen {
            session.first_seen = event.timestamp;
            session.entry_url = event.url.clone();
        }
        if event.timestamp > session.last_seen {
            session.last_seen = event.timestamp;
        }
    }

    let total = sessions.len();
    let page: Vec<_> = if offset >= total {
        Vec::new()
    } else {
        sessions.drain(..).skip(offset).take(limit).collect()
    };

    Ok(Json(json!({"sessions": page, "total": total})))
}

/// GET /api/v1/sessions/{id} — event timeline for one session.
pub async fn session_detail(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Path(session_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    if session_id.is_empty() {
        return Err(AppError::Validation("session_id required".to_string()));
    }

    let events = state.events.query_events(&EventFilter {
        project_id: project.id.clone(),
        session_id: Some(session_id.clone()),
        limit: Some(1000),
        ..Default::default()
    })?;

    Ok(Json(json!({
        "session_id": session_id,
        "events": events,
        "count": events.len(),
    })))
}
