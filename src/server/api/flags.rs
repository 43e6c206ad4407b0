// Feature flags endpoints - CRUD plus deterministic evaluation
//
// Evaluation hashes `distinct_id + ":" + flag_id` with 32-bit FNV-1a and
// compares the value mod 100 against the rollout percentage. The same
// distinct id always lands in the same bucket, and across ids the enabled
// fraction converges to the rollout.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::server::auth::{ApiKeyProject, SessionProject};
use crate::server::AppState;
use crate::storage::meta::FeatureFlag;

use super::generate_id;

/// GET /api/v1/flags
pub async fn list(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
) -> AppResult<Json<serde_json::Value>> {
    let flags = state.meta.list_feature_flags(&project.id)?;
    Ok(Json(json!({"flags": flags})))
}

#[derive(Debug, Deserialize)]
pub struct CreateFlag {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rollout_percentage: i64,
}

/// POST /api/v1/flags — new flags start enabled; rollout defaults to 100.
pub async fn create(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Json(body): Json<CreateFlag>,
) -> AppResult<(StatusCode, Json<FeatureFlag>)> {
    if body.key.is_empty() || body.name.is_empty() {
        return Err(AppError::Validation("key and name are required".to_string()));
    }

    let rollout = if body.rollout_percentage <= 0 {
        100
    } else {
        body.rollout_percentage.min(100)
    };
    let now = Utc::now();
    let flag = FeatureFlag {
        id: generate_id(),
        project_id: project.id.clone(),
        key: body.key,
        name: body.name,
        enabled: true,
        rollout_percentage: rollout,
        created_at: now,
        updated_at: now,
    };
    state.meta.create_feature_flag(&flag)?;
    Ok((StatusCode::CREATED, Json(flag)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateFlag {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub rollout_percentage: i64,
}

/// PUT /api/v1/flags/{id}
pub async fn update(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Path(id): Path<String>,
    Json(body): Json<UpdateFlag>,
) -> AppResult<Json<serde_json::Value>> {
    state
        .meta
        .update_feature_flag(&project.id, &id, body.enabled, body.rollout_percentage)?;
    Ok(Json(json!({"status": "ok"})))
}

/// DELETE /api/v1/flags/{id}
pub async fn delete_one(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.meta.delete_feature_flag(&project.id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct EvaluateQuery {
    #[serde(default)]
    pub distinct_id: String,
}

/// GET /api/v1/flags/evaluate?distinct_id=... (API-key auth) — evaluate
/// every flag for one distinct id.
pub async fn evaluate(
    State(state): State<AppState>,
    ApiKeyProject(project): ApiKeyProject,
    Query(params): Query<EvaluateQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let flags = state.meta.list_feature_flags(&project.id)?;
    let mut result = serde_json::Map::with_capacity(flags.len());
    for flag in flags {
        result.insert(
            flag.key.clone(),
            json!(evaluate_flag(&flag, &params.distinct_id)),
        );
    }
    Ok(Json(json!({"flags": result})))
}

fn evaluate_flag(flag: &FeatureFlag, distinct_id: &str) -> bool {
    if !flag.enabled {
        return false;
    }
    if flag.rollout_percentage >= 100 {
        return true;
    }
    let bucket = fnv1a_32(format!("{distinct_id}:{}", flag.id).as_bytes()) % 100;
    (bucket as i64) < flag.rollout_percentage
}

/// 32-bit FNV-1a. The rollout bucketing depends on this exact variant, so
/// it is written out rather than pulled from a hashing crate.
fn fnv1a_32(data: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c9dc5;
    for &byte in data {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x01000193);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flag(enabled: bool, rollout: i64) -> FeatureFlag {
        FeatureFlag {
            id: "flag-1".into(),
            project_id: "p1".into(),
            key: "new-checkout".into(),
            name: "New checkout".into(),
            enabled,
            rollout_percentage: rollout,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn fnv1a_reference_vectors() {
        // Standard FNV-1a 32-bit test vectors.
        assert_eq!(fnv1a_32(b""), 0x811c9dc5);
        assert_eq!(fnv1a_32(b"a"), 0xe40c292c);
        assert_eq!(fnv1a_32(b"foobar"), 0xbf9cf968);
    }

    #[test]
    fn disabled_flag_is_always_false() {
        let f = flag(false, 100);
        assert!(!evaluate_flag(&f, "alice"));
    }

    #[test]
    fn full_rollout_is_always_true() {
        let f = flag(true, 100);
        assert!(evaluate_flag(&f, "alice"));
        assert!(evaluate_flag(&f, "bob"));
    }

    #[test]
    fn evaluation_is_deterministic_per_distinct_id() {
        let f = flag(true, 30);
        let first = evaluate_flag(&f, "alice");
        for _ in 0..100 {
            assert_eq!(evaluate_flag(&f, "alice"), first);
        }
    }

    #[test]
    fn rollout_fraction_converges() {
        let f = flag(true, 30);
        let enabled = (0..10_000)
            .filter(|i| evaluate_flag(&f, &format!("user-{i}")))
            .count();
        let fraction = enabled as f64 / 10_000.0;
        assert!(
            (fraction - 0.30).abs() < 0.03,
            "fraction {fraction} should approximate rollout 0.30"
        );
    }
}
