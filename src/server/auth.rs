//! Request authentication
//!
//! Two extractors guard the HTTP surface:
//! - [`ApiKeyProject`] (`X-API-Key` header) for SDK endpoints — resolves
//!   directly to the owning project.
//! - [`SessionProject`] (cookie or bearer token) for dashboard endpoints —
//!   validates the caller's session, then attaches the deployment's single
//!   active project. Dev mode skips the token check.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::storage::meta::Project;

use super::AppState;

pub const SESSION_COOKIE: &str = "clicknook_session";

/// Project resolved from the `X-API-Key` header.
pub struct ApiKeyProject(pub Project);

#[async_trait]
impl FromRequestParts<AppState> for ApiKeyProject {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let api_key = parts
            .headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if api_key.is_empty() {
            return Err(AppError::Unauthorized);
        }

        let project = state
            .meta
            .get_project_by_api_key(api_key)?
            .ok_or(AppError::Unauthorized)?;
        Ok(Self(project))
    }
}

/// Project resolved from a dashboard session. One active project per
/// deployment; the session only proves the caller may see it.
pub struct SessionProject(pub Project);

#[async_trait]
impl FromRequestParts<AppState> for SessionProject {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        if !state.config.dev_mode {
            let token = session_token(parts).ok_or(AppError::Unauthorized)?;
            state
                .meta
                .get_user_session(&token)?
                .ok_or(AppError::Unauthorized)?;
        }

        let project = state
            .meta
            .list_projects()?
            .into_iter()
            .next()
            .ok_or(AppError::Unauthorized)?;
        Ok(Self(project))
    }
}

fn session_token(parts: &Parts) -> Option<String> {
    // Cookie first, bearer token as a fallback for non-browser clients.
    if let Some(cookies) = parts
        .headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
    {
        for pair in cookies.split(';') {
            if let Some(value) = pair.trim().strip_prefix(&format!("{SESSION_COOKIE}=")) {
                return Some(value.to_string());
            }
        }
    }

    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}
