// Settings endpoints - project info, LLM config, source connection
//
// Saving the LLM config hot-reloads the naming provider and kicks off a
// best-effort backfill of unnamed fingerprints. Saving a source connection
// verifies the token against the code host, then wires the matcher into the
// naming pipeline.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::naming::provider_from_config;
use crate::server::auth::SessionProject;
use crate::server::AppState;
use crate::storage::meta::{LlmConfig, Project, SourceConnection};

/// GET /api/v1/project — the active project, including its API key.
pub async fn project(SessionProject(project): SessionProject) -> Json<Project> {
    Json(project)
}

/// GET /api/v1/llm/config — current config with the API key masked.
pub async fn get_llm_config(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
) -> AppResult<Json<serde_json::Value>> {
    let Some(config) = state.meta.get_llm_config(&project.id)? else {
        return Ok(Json(json!({
            "provider": "",
            "model": "",
            "base_url": "",
            "api_key_set": false,
        })));
    };

    let api_key = config.api_key.as_deref().unwrap_or_default();
    Ok(Json(json!({
        "provider": config.provider,
        "model": config.model,
        "base_url": config.base_url.unwrap_or_default(),
        "api_key_set": !api_key.is_empty(),
        "api_key_hint": mask_api_key(api_key),
    })))
}

/// PUT /api/v1/llm/config — save, hot-reload the provider, backfill.
pub async fn set_llm_config(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Json(mut config): Json<LlmConfig>,
) -> AppResult<Json<serde_json::Value>> {
    config.project_id = project.id.clone();

    // An omitted key means "keep the stored one" so the dashboard can save
    // model changes without re-entering the secret.
    if config.api_key.as_deref().unwrap_or_default().is_empty() {
        if let Some(existing) = state.meta.get_llm_config(&project.id)? {
            config.api_key = existing.api_key;
        }
    }

    state.meta.set_llm_config(&config)?;

    let provider = provider_from_config(Some(&config));
    let enabled = provider.is_some();
    state.namer.set_provider(provider);
    if enabled {
        tracing::info!("naming provider updated: {}/{}", config.provider, config.model);
        let namer = state.namer.clone();
        let project_id = project.id.clone();
        tokio::spawn(async move {
            namer.backfill(&project_id);
        });
    } else {
        tracing::info!("naming provider cleared");
    }

    Ok(Json(json!({"status": "ok"})))
}

/// GET /api/v1/source — connection status (never the token).
pub async fn get_source(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
) -> AppResult<Json<serde_json::Value>> {
    match state.meta.get_source_connection(&project.id)? {
        Some(conn) => Ok(Json(json!({
            "connected": true,
            "repo_owner": conn.repo_owner,
            "repo_name": conn.repo_name,
            "default_branch": conn.default_branch,
            "last_synced_at": conn.last_synced_at,
        }))),
        None => Ok(Json(json!({"connected": false}))),
    }
}

#[derive(Debug, Deserialize)]
pub struct ConnectSource {
    #[serde(default)]
    pub repo_owner: String,
    #[serde(default)]
    pub repo_name: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub default_branch: String,
}

/// PUT /api/v1/source — save a verified connection and enable source
/// matching for the naming pipeline.
pub async fn set_source(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Json(mut body): Json<ConnectSource>,
) -> AppResult<Json<serde_json::Value>> {
    // Reuse the stored token when the dashboard only edits repo details.
    if body.access_token.is_empty() {
        if let Some(existing) = state.meta.get_source_connection(&project.id)? {
            body.access_token = existing.access_token;
        }
    }
    if body.repo_owner.is_empty() || body.repo_name.is_empty() || body.access_token.is_empty() {
        return Err(AppError::Validation(
            "repo_owner, repo_name, and access_token are required".to_string(),
        ));
    }
    if body.default_branch.is_empty() {
        body.default_branch = "main".to_string();
    }

    state
        .matcher
        .verify_connection(&body.repo_owner, &body.repo_name, &body.access_token, &body.default_branch)
        .await
        .map_err(|e| AppError::Upstream(format!("failed to access repo: {e}")))?;

    state.meta.set_source_connection(&SourceConnection {
        project_id: project.id.clone(),
        repo_owner: body.repo_owner,
        repo_name: body.repo_name,
        access_token: body.access_token,
        default_branch: body.default_branch,
        last_synced_at: None,
    })?;

    state.namer.set_matcher(Some(state.matcher.clone()));

    Ok(Json(json!({"status": "ok"})))
}

/// Mask a secret for display: keep the recognizable prefix and the last
/// four characters.
fn mask_api_key(key: &str) -> String {
    if key.is_empty() {
        return String::new();
    }
    if key.len() <= 8 {
        return "••••".to_string();
    }

    // First segment up to the second dash ("sk-ant-"), else first 6 chars.
    let prefix = match key[3..].find('-') {
        Some(idx) => &key[..idx + 4],
        None => &key[..6.min(key.len())],
    };
    format!("{prefix}...{}", &key[key.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_keeps_prefix_and_tail() {
        assert_eq!(mask_api_key("sk-ant-api03-abcdefa1b2"), "sk-ant-...a1b2");
        assert_eq!(mask_api_key("short"), "••••");
        assert_eq!(mask_api_key(""), "");
    }
}
