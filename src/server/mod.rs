//! HTTP server wiring
//!
//! Builds the axum router over shared state and serves it with graceful
//! shutdown. Endpoint handlers live one file per concern under [`api`];
//! the live SSE feed is in [`live`]. Authentication is extractor-based
//! (see [`auth`]): SDK endpoints take an API key, dashboard endpoints a
//! session.

pub mod api;
pub mod auth;
pub mod live;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::naming::Namer;
use crate::source::Matcher;
use crate::storage::{EventStore, MetaStore};

/// Shared handles for request handlers. Cheap to clone; everything inside
/// is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub events: Arc<EventStore>,
    pub meta: Arc<MetaStore>,
    pub namer: Arc<Namer>,
    pub matcher: Arc<Matcher>,
}

/// Build the full API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Ingestion (API-key auth via extractor)
        .route(
            "/api/v1/events",
            post(api::ingest::ingest).get(api::events::list_events),
        )
        .route("/api/v1/flags/evaluate", get(api::flags::evaluate))
        // Query plane (session auth via extractor)
        .route("/api/v1/events/stats", get(api::events::event_stats))
        .route("/api/v1/events/live", get(live::live_events))
        .route("/api/v1/errors", get(api::events::list_errors))
        .route("/api/v1/trends", get(api::trends::trends))
        .route("/api/v1/trends/breakdown", get(api::trends::trends_breakdown))
        .route("/api/v1/pages", get(api::pages::top_pages))
        .route("/api/v1/sessions", get(api::sessions::list_sessions))
        .route("/api/v1/sessions/:id", get(api::sessions::session_detail))
        .route("/api/v1/users", get(api::users::list_users))
        .route("/api/v1/users/:id/events", get(api::users::user_events))
        .route("/api/v1/properties/keys", get(api::properties::keys))
        .route("/api/v1/properties/values", get(api::properties::values))
        .route("/api/v1/paths", get(api::paths::paths))
        .route("/api/v1/heatmap", get(api::heatmap::heatmap))
        .route("/api/v1/retention", get(api::retention::retention))
        // Funnels
        .route("/api/v1/funnels", get(api::funnels::list).post(api::funnels::create))
        .route(
            "/api/v1/funnels/:id",
            get(api::funnels::get_one).delete(api::funnels::delete_one),
        )
        .route("/api/v1/funnels/:id/results", get(api::funnels::results))
        .route("/api/v1/funnels/:id/cohorts", get(api::funnels::cohorts))
        .route("/api/v1/funnels/suggest", post(api::ai::suggest_funnels))
        // AI chat
        .route("/api/v1/ai/chat", post(api::ai::chat))
        // Dashboards
        .route("/api/v1/dashboards", get(api::dashboards::list).post(api::dashboards::create))
        .route(
            "/api/v1/dashboards/:id",
            get(api::dashboards::get_one)
                .put(api::dashboards::update)
                .delete(api::dashboards::delete_one),
        )
        // Feature flags
        .route("/api/v1/flags", get(api::flags::list).post(api::flags::create))
        .route("/api/v1/flags/:id", put(api::flags::update).delete(api::flags::delete_one))
        // Alerts
        .route("/api/v1/alerts", get(api::alerts::list).post(api::alerts::create))
        .route("/api/v1/alerts/:id", put(api::alerts::update).delete(api::alerts::delete_one))
        // Event names
        .route("/api/v1/names", get(api::names::list))
        .route("/api/v1/names/:fp", put(api::names::override_name))
        // Project & settings
        .route("/api/v1/project", get(api::settings::project))
        .route(
            "/api/v1/llm/config",
            get(api::settings::get_llm_config).put(api::settings::set_llm_config),
        )
        .route(
            "/api/v1/source",
            get(api::settings::get_source).put(api::settings::set_source),
        )
        // Health (no auth)
        .route(
            "/api/health",
            get(|| async { Json(json!({"status": "ok"})) }),
        )
        .with_state(state)
}

/// Bind and serve until the shutdown signal resolves.
pub async fn serve(
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listen = state.config.listen;
    let app = build_router(state);

    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("binding {listen}"))?;
    tracing::info!("listening on {listen}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("server error")?;

    tracing::info!("server shut down gracefully");
    Ok(())
}
