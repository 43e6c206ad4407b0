// Events endpoints - filtered listing, top-name stats, captured errors

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::AppResult;
use crate::server::auth::SessionProject;
use crate::server::AppState;
use crate::storage::{Event, EventFilter};

use super::resolve_days;
use chrono::{DateTime, Utc};

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    pub event_type: Option<String>,
    pub event_name: Option<String>,
    pub fingerprint: Option<String>,
    pub session_id: Option<String>,
    pub distinct_id: Option<String>,
    pub property_key: Option<String>,
    pub property_value: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// GET /api/v1/events — list events with filters, names resolved from the
/// cache where the stored row has none yet.
pub async fn list_events(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Query(params): Query<EventsQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let filter = EventFilter {
        project_id: project.id.clone(),
        event_type: params.event_type,
        event_name: params.event_name,
        fingerprint: params.fingerprint,
        session_id: params.session_id,
        distinct_id: params.distinct_id,
        property_key: params.property_key,
        property_value: params.property_value,
        start: params.start,
        end: params.end,
        limit: params.limit,
        offset: params.offset,
    };

    let mut events = state.events.query_events(&filter)?;
    enrich_event_names(&state, &project.id, &mut events)?;

    Ok(Json(json!({"events": events, "count": events.len()})))
}

/// GET /api/v1/events/stats — top named events by frequency.
pub async fn event_stats(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Query(params): Query<StatsQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let (start, end) = resolve_days(params.start, params.end, 7);
    let stats = state.events.query_top_event_names(
        &project.id,
        Some(start),
        Some(end),
        params.limit.unwrap_or(50),
    )?;
    Ok(Json(json!({"stats": stats})))
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// GET /api/v1/errors — captured error events, default window 7 days.
pub async fn list_errors(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Query(params): Query<StatsQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let (start, end) = resolve_days(params.start, params.end, 7);
    let errors = state.events.query_events(&EventFilter {
        project_id: project.id.clone(),
        event_type: Some("error".to_string()),
        start: Some(start),
        end: Some(end),
        limit: Some(params.limit.unwrap_or(500)),
        ..Default::default()
    })?;
    Ok(Json(json!({"errors": errors, "count": errors.len()})))
}

/// Fill missing `event_name`s from the cache, preferring user overrides.
pub(super) fn enrich_event_names(
    state: &AppState,
    project_id: &str,
    events: &mut [Event],
) -> anyhow::Result<()> {
    let mut fingerprints: Vec<String> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for event in events.iter() {
        if event.event_name.is_none() && seen.insert(event.fingerprint.clone()) {
            fingerprints.push(event.fingerprint.clone());
        }
    }
    if fingerprints.is_empty() {
        return Ok(());
    }

    let cache = state.meta.batch_get_event_names(project_id, &fingerprints)?;
    for event in events.iter_mut() {
        if event.event_name.is_some() {
            continue;
        }
        if let Some(en) = cache.get(&event.fingerprint) {
            event.event_name = Some(en.display_name().to_string());
        }
    }
    Ok(())
}
