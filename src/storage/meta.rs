//! Relational metadata store (SQLite)
//!
//! Holds the small, relationally-shaped state: projects, the event-name
//! cache, LLM and source-host configuration, funnels, dashboards, feature
//! flags, alerts, and dashboard user sessions. WAL mode keeps readers
//! concurrent with the single writer; a small r2d2 pool serves the query
//! side.
//!
//! Sensitive fields (LLM API key, source-host access token) pass through the
//! [`Encryptor`] on their way in and out.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::encrypt::Encryptor;
use super::events::FunnelStep;
use super::migrations::{SQLITE_MIGRATIONS, TRACKING_TABLE_SQL};

#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub api_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventName {
    pub fingerprint: String,
    pub project_id: String,
    pub ai_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl EventName {
    /// Display name: user override wins over the AI-generated name.
    pub fn display_name(&self) -> &str {
        match &self.user_name {
            Some(name) if !name.is_empty() => name,
            _ => &self.ai_name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub project_id: String,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SourceConnection {
    pub project_id: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub access_token: String,
    pub default_branch: String,
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct SourceIndexEntry {
    pub file_path: String,
    pub component_name: Option<String>,
    pub selectors: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Funnel {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub steps: Vec<FunnelStep>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub config: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureFlag {
    pub id: String,
    pub project_id: String,
    pub key: String,
    pub name: String,
    pub enabled: bool,
    pub rollout_percentage: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub metric: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    pub threshold: i64,
    pub window_minutes: i64,
    pub webhook_url: String,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub struct MetaStore {
    pool: Pool<SqliteConnectionManager>,
    enc: Encryptor,
}

impl MetaStore {
    /// Open (or create) the metadata database and run pending migrations.
    pub fn open(path: &Path, enc: Encryptor) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
        });
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .context("building sqlite pool")?;

        let store = Self { pool, enc };
        store.migrate()?;
        Ok(store)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().context("getting sqlite connection")
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(TRACKING_TABLE_SQL, [])
            .context("creating schema_migrations table")?;

        for m in SQLITE_MIGRATIONS {
            let applied: bool = conn
                .query_row(
                    "SELECT COUNT(*) FROM schema_migrations WHERE filename = ?1",
                    params![m.name],
                    |row| row.get::<_, i64>(0),
                )
                .map(|n| n > 0)?;
            if applied {
                continue;
            }
            conn.execute_batch(m.sql)
                .with_context(|| format!("executing migration {}", m.name))?;
            conn.execute(
                "INSERT INTO schema_migrations (filename) VALUES (?1)",
                params![m.name],
            )?;
        }
        Ok(())
    }

    /// Flush the WAL into the main database file (called on shutdown).
    pub fn checkpoint(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }

    // ── Projects ──────────────────────────────────────────────────────────

    /// Create a project with a freshly generated `cn_`-prefixed API key.
    pub fn create_project(&self, id: &str, name: &str) -> Result<Project> {
        let api_key = generate_api_key();
        let now = Utc::now();
        self.conn()?.execute(
            "INSERT INTO projects (id, name, api_key, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, name, api_key, now],
        )?;
        Ok(Project {
            id: id.to_string(),
            name: name.to_string(),
            api_key,
            created_at: now,
        })
    }

    pub fn get_project_by_api_key(&self, api_key: &str) -> Result<Option<Project>> {
        let conn = self.conn()?;
        let project = conn
            .query_row(
                "SELECT id, name, api_key, created_at FROM projects WHERE api_key = ?1",
                params![api_key],
                row_to_project,
            )
            .optional()?;
        Ok(project)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, api_key, created_at FROM projects ORDER BY created_at DESC",
        )?;
        let projects = stmt
            .query_map([], row_to_project)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(projects)
    }

    // ── Event names ───────────────────────────────────────────────────────

    pub fn get_event_name(&self, project_id: &str, fingerprint: &str) -> Result<Option<EventName>> {
        let conn = self.conn()?;
        let name = conn
            .query_row(
                "SELECT fingerprint, project_id, ai_name, user_name, source_file, confidence, created_at
                 FROM event_names WHERE project_id = ?1 AND fingerprint = ?2",
                params![project_id, fingerprint],
                row_to_event_name,
            )
            .optional()?;
        Ok(name)
    }

    /// Resolve names for a batch of fingerprints in one query. Used to
    /// enrich event listings without an N+1 lookup.
    pub fn batch_get_event_names(
        &self,
        project_id: &str,
        fingerprints: &[String],
    ) -> Result<std::collections::HashMap<String, EventName>> {
        let mut result = std::collections::HashMap::with_capacity(fingerprints.len());
        if fingerprints.is_empty() {
            return Ok(result);
        }

        let placeholders = vec!["?"; fingerprints.len()].join(",");
        let sql = format!(
            "SELECT fingerprint, project_id, ai_name, user_name, source_file, confidence, created_at
             FROM event_names WHERE project_id = ? AND fingerprint IN ({placeholders})"
        );

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut args: Vec<&dyn rusqlite::ToSql> = vec![&project_id];
        for fp in fingerprints {
            args.push(fp);
        }
        let rows = stmt.query_map(args.as_slice(), row_to_event_name)?;
        for row in rows {
            let en = row?;
            result.insert(en.fingerprint.clone(), en);
        }
        Ok(result)
    }

    /// UPSERT an AI-generated name. A user override already present on the
    /// row is left untouched.
    pub fn set_event_name(
        &self,
        project_id: &str,
        fingerprint: &str,
        ai_name: &str,
        source_file: Option<&str>,
        confidence: Option<f64>,
    ) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO event_names (fingerprint, project_id, ai_name, source_file, confidence)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (fingerprint, project_id)
             DO UPDATE SET ai_name = excluded.ai_name, source_file = excluded.source_file,
                           confidence = excluded.confidence",
            params![fingerprint, project_id, ai_name, source_file, confidence],
        )?;
        Ok(())
    }

    /// Set a user-provided name that takes priority over the AI name.
    pub fn override_event_name(
        &self,
        project_id: &str,
        fingerprint: &str,
        user_name: &str,
    ) -> Result<()> {
        self.conn()?.execute(
            "UPDATE event_names SET user_name = ?1 WHERE project_id = ?2 AND fingerprint = ?3",
            params![user_name, project_id, fingerprint],
        )?;
        Ok(())
    }

    pub fn list_event_names(&self, project_id: &str) -> Result<Vec<EventName>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT fingerprint, project_id, ai_name, user_name, source_file, confidence, created_at
             FROM event_names WHERE project_id = ?1 ORDER BY created_at DESC",
        )?;
        let names = stmt
            .query_map(params![project_id], row_to_event_name)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    // ── LLM config ────────────────────────────────────────────────────────

    pub fn get_llm_config(&self, project_id: &str) -> Result<Option<LlmConfig>> {
        let conn = self.conn()?;
        let config = conn
            .query_row(
                "SELECT project_id, provider, api_key, model, base_url
                 FROM llm_config WHERE project_id = ?1",
                params![project_id],
                |row| {
                    Ok(LlmConfig {
                        project_id: row.get(0)?,
                        provider: row.get(1)?,
                        api_key: row.get(2)?,
                        model: row.get(3)?,
                        base_url: row.get(4)?,
                    })
                },
            )
            .optional()?;

        match config {
            Some(mut c) => {
                c.api_key = self
                    .enc
                    .decrypt_opt(c.api_key.as_deref())
                    .context("decrypting llm api key")?;
                Ok(Some(c))
            }
            None => Ok(None),
        }
    }

    pub fn set_llm_config(&self, config: &LlmConfig) -> Result<()> {
        let enc_key = self
            .enc
            .encrypt_opt(config.api_key.as_deref())
            .context("encrypting llm api key")?;
        self.conn()?.execute(
            "INSERT INTO llm_config (project_id, provider, api_key, model, base_url)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (project_id)
             DO UPDATE SET provider = excluded.provider, api_key = excluded.api_key,
                           model = excluded.model, base_url = excluded.base_url",
            params![
                config.project_id,
                config.provider,
                enc_key,
                config.model,
                config.base_url
            ],
        )?;
        Ok(())
    }

    // ── Source connections & index ────────────────────────────────────────

    pub fn get_source_connection(&self, project_id: &str) -> Result<Option<SourceConnection>> {
        let conn = self.conn()?;
        let connection = conn
            .query_row(
                "SELECT project_id, repo_owner, repo_name, access_token, default_branch, last_synced_at
                 FROM source_connections WHERE project_id = ?1",
                params![project_id],
                |row| {
                    Ok(SourceConnection {
                        project_id: row.get(0)?,
                        repo_owner: row.get(1)?,
                        repo_name: row.get(2)?,
                        access_token: row.get(3)?,
                        default_branch: row.get(4)?,
                        last_synced_at: row.get(5)?,
                    })
                },
            )
            .optional()?;

        match connection {
            Some(mut c) => {
                c.access_token = self
                    .enc
                    .decrypt(&c.access_token)
                    .context("decrypting source access token")?;
                Ok(Some(c))
            }
            None => Ok(None),
        }
    }

    pub fn set_source_connection(&self, connection: &SourceConnection) -> Result<()> {
        let enc_token = self
            .enc
            .encrypt(&connection.access_token)
            .context("encrypting source access token")?;
        self.conn()?.execute(
            "INSERT INTO source_connections (project_id, repo_owner, repo_name, access_token, default_branch)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (project_id)
             DO UPDATE SET repo_owner = excluded.repo_owner, repo_name = excluded.repo_name,
                           access_token = excluded.access_token, default_branch = excluded.default_branch",
            params![
                connection.project_id,
                connection.repo_owner,
                connection.repo_name,
                enc_token,
                connection.default_branch
            ],
        )?;
        Ok(())
    }

    pub fn upsert_source_index(
        &self,
        project_id: &str,
        file_path: &str,
        component_name: Option<&str>,
        selectors: &str,
        content_hash: &str,
    ) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO source_index (project_id, file_path, component_name, selectors, content_hash)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (project_id, file_path)
             DO UPDATE SET component_name = excluded.component_name, selectors = excluded.selectors,
                           content_hash = excluded.content_hash, updated_at = CURRENT_TIMESTAMP",
            params![project_id, file_path, component_name, selectors, content_hash],
        )?;
        Ok(())
    }

    pub fn list_source_index(&self, project_id: &str) -> Result<Vec<SourceIndexEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT file_path, component_name, selectors FROM source_index WHERE project_id = ?1",
        )?;
        let entries = stmt
            .query_map(params![project_id], |row| {
                Ok(SourceIndexEntry {
                    file_path: row.get(0)?,
                    component_name: row.get(1)?,
                    selectors: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    // ── Funnels ───────────────────────────────────────────────────────────

    pub fn create_funnel(&self, id: &str, project_id: &str, name: &str, steps: &[FunnelStep]) -> Result<Funnel> {
        let steps_json = serde_json::to_string(steps)?;
        let now = Utc::now();
        self.conn()?.execute(
            "INSERT INTO funnels (id, project_id, name, steps, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, project_id, name, steps_json, now],
        )?;
        Ok(Funnel {
            id: id.to_string(),
            project_id: project_id.to_string(),
            name: name.to_string(),
            steps: steps.to_vec(),
            created_at: now,
        })
    }

    pub fn get_funnel(&self, project_id: &str, id: &str) -> Result<Option<Funnel>> {
        let conn = self.conn()?;
        let funnel = conn
            .query_row(
                "SELECT id, project_id, name, steps, created_at FROM funnels
                 WHERE project_id = ?1 AND id = ?2",
                params![project_id, id],
                row_to_funnel,
            )
            .optional()?;
        Ok(funnel)
    }

    pub fn list_funnels(&self, project_id: &str) -> Result<Vec<Funnel>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, name, steps, created_at FROM funnels
             WHERE project_id = ?1 ORDER BY created_at DESC",
        )?;
        let funnels = stmt
            .query_map(params![project_id], row_to_funnel)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(funnels)
    }

    pub fn delete_funnel(&self, project_id: &str, id: &str) -> Result<()> {
        self.conn()?.execute(
            "DELETE FROM funnels WHERE project_id = ?1 AND id = ?2",
            params![project_id, id],
        )?;
        Ok(())
    }

    // ── Dashboards ────────────────────────────────────────────────────────

    pub fn create_dashboard(&self, id: &str, project_id: &str, name: &str, config: &serde_json::Value) -> Result<Dashboard> {
        let now = Utc::now();
        self.conn()?.execute(
            "INSERT INTO dashboards (id, project_id, name, config, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![id, project_id, name, config.to_string(), now],
        )?;
        Ok(Dashboard {
            id: id.to_string(),
            project_id: project_id.to_string(),
            name: name.to_string(),
            config: config.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_dashboard(&self, project_id: &str, id: &str) -> Result<Option<Dashboard>> {
        let conn = self.conn()?;
        let dashboard = conn
            .query_row(
                "SELECT id, project_id, name, config, created_at, updated_at FROM dashboards
                 WHERE project_id = ?1 AND id = ?2",
                params![project_id, id],
                row_to_dashboard,
            )
            .optional()?;
        Ok(dashboard)
    }

    pub fn list_dashboards(&self, project_id: &str) -> Result<Vec<Dashboard>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, name, config, created_at, updated_at FROM dashboards
             WHERE project_id = ?1 ORDER BY updated_at DESC",
        )?;
        let dashboards = stmt
            .query_map(params![project_id], row_to_dashboard)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(dashboards)
    }

    pub fn update_dashboard(&self, project_id: &str, id: &str, name: &str, config: &serde_json::Value) -> Result<()> {
        self.conn()?.execute(
            "UPDATE dashboards SET name = ?1, config = ?2, updated_at = CURRENT_TIMESTAMP
             WHERE project_id = ?3 AND id = ?4",
            params![name, config.to_string(), project_id, id],
        )?;
        Ok(())
    }

    pub fn delete_dashboard(&self, project_id: &str, id: &str) -> Result<()> {
        self.conn()?.execute(
            "DELETE FROM dashboards WHERE project_id = ?1 AND id = ?2",
            params![project_id, id],
        )?;
        Ok(())
    }

    // ── Feature flags ─────────────────────────────────────────────────────

    pub fn create_feature_flag(&self, flag: &FeatureFlag) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO feature_flags (id, project_id, key, name, enabled, rollout_percentage, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                flag.id,
                flag.project_id,
                flag.key,
                flag.name,
                flag.enabled,
                flag.rollout_percentage,
                flag.created_at
            ],
        )?;
        Ok(())
    }

    pub fn list_feature_flags(&self, project_id: &str) -> Result<Vec<FeatureFlag>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, key, name, enabled, rollout_percentage, created_at, updated_at
             FROM feature_flags WHERE project_id = ?1 ORDER BY created_at DESC",
        )?;
        let flags = stmt
            .query_map(params![project_id], |row| {
                Ok(FeatureFlag {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    key: row.get(2)?,
                    name: row.get(3)?,
                    enabled: row.get(4)?,
                    rollout_percentage: row.get(5)?,
                    created_at: row.get(6)?,
                    updated_at: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(flags)
    }

    pub fn update_feature_flag(&self, project_id: &str, id: &str, enabled: bool, rollout_pct: i64) -> Result<()> {
        self.conn()?.execute(
            "UPDATE feature_flags SET enabled = ?1, rollout_percentage = ?2, updated_at = CURRENT_TIMESTAMP
             WHERE project_id = ?3 AND id = ?4",
            params![enabled, rollout_pct, project_id, id],
        )?;
        Ok(())
    }

    pub fn delete_feature_flag(&self, project_id: &str, id: &str) -> Result<()> {
        self.conn()?.execute(
            "DELETE FROM feature_flags WHERE project_id = ?1 AND id = ?2",
            params![project_id, id],
        )?;
        Ok(())
    }

    // ── Alerts ────────────────────────────────────────────────────────────

    pub fn create_alert(&self, alert: &Alert) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO alerts (id, project_id, name, metric, event_name, threshold, window_minutes, webhook_url, enabled, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                alert.id,
                alert.project_id,
                alert.name,
                alert.metric,
                alert.event_name,
                alert.threshold,
                alert.window_minutes,
                alert.webhook_url,
                alert.enabled,
                alert.created_at
            ],
        )?;
        Ok(())
    }

    pub fn list_alerts(&self, project_id: &str) -> Result<Vec<Alert>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, name, metric, event_name, threshold, window_minutes, webhook_url, enabled, last_triggered_at, created_at
             FROM alerts WHERE project_id = ?1 ORDER BY created_at DESC",
        )?;
        let alerts = stmt
            .query_map(params![project_id], row_to_alert)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(alerts)
    }

    /// All enabled alerts across projects, for the background scheduler.
    pub fn list_all_enabled_alerts(&self) -> Result<Vec<Alert>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, name, metric, event_name, threshold, window_minutes, webhook_url, enabled, last_triggered_at, created_at
             FROM alerts WHERE enabled = 1 ORDER BY created_at DESC",
        )?;
        let alerts = stmt
            .query_map([], row_to_alert)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(alerts)
    }

    pub fn update_alert(&self, project_id: &str, id: &str, enabled: bool, threshold: i64, webhook_url: &str) -> Result<()> {
        self.conn()?.execute(
            "UPDATE alerts SET enabled = ?1, threshold = ?2, webhook_url = ?3
             WHERE project_id = ?4 AND id = ?5",
            params![enabled, threshold, webhook_url, project_id, id],
        )?;
        Ok(())
    }

    pub fn delete_alert(&self, project_id: &str, id: &str) -> Result<()> {
        self.conn()?.execute(
            "DELETE FROM alerts WHERE project_id = ?1 AND id = ?2",
            params![project_id, id],
        )?;
        Ok(())
    }

    pub fn update_alert_triggered(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        self.conn()?.execute(
            "UPDATE alerts SET last_triggered_at = ?1 WHERE id = ?2",
            params![at, id],
        )?;
        Ok(())
    }

    // ── Dashboard users & sessions ────────────────────────────────────────
    //
    // Auth flows live outside the core; the store only keeps the token →
    // (user, expiry) mapping the session middleware checks.

    pub fn create_user(&self, email: &str, password_hash: &str) -> Result<String> {
        let id = generate_token(16);
        self.conn()?.execute(
            "INSERT INTO users (id, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, email, password_hash, Utc::now()],
        )?;
        Ok(id)
    }

    pub fn create_user_session(&self, user_id: &str, expires_at: DateTime<Utc>) -> Result<String> {
        let token = generate_token(32);
        self.conn()?.execute(
            "INSERT INTO user_sessions (token, user_id, expires_at, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![token, user_id, expires_at, Utc::now()],
        )?;
        Ok(token)
    }

    /// Resolve a session token to its user id, treating expired sessions as
    /// absent.
    pub fn get_user_session(&self, token: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let row: Option<(String, DateTime<Utc>)> = conn
            .query_row(
                "SELECT user_id, expires_at FROM user_sessions WHERE token = ?1",
                params![token],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((user_id, expires_at)) if Utc::now() < expires_at => Ok(Some(user_id)),
            _ => Ok(None),
        }
    }

    pub fn delete_user_session(&self, token: &str) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM user_sessions WHERE token = ?1", params![token])?;
        Ok(())
    }
}

// ── Row mappers ───────────────────────────────────────────────────────────

fn row_to_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        api_key: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn row_to_event_name(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventName> {
    Ok(EventName {
        fingerprint: row.get(0)?,
        project_id: row.get(1)?,
        ai_name: row.get(2)?,
        user_name: row.get(3)?,
        source_file: row.get(4)?,
        confidence: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn row_to_funnel(row: &rusqlite::Row<'_>) -> rusqlite::Result<Funnel> {
    let steps_json: String = row.get(3)?;
    let steps = serde_json::from_str(&steps_json).unwrap_or_default();
    Ok(Funnel {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        steps,
        created_at: row.get(4)?,
    })
}

fn row_to_alert(row: &rusqlite::Row<'_>) -> rusqlite::Result<Alert> {
    Ok(Alert {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        metric: row.get(3)?,
        event_name: row.get(4)?,
        threshold: row.get(5)?,
        window_minutes: row.get(6)?,
        webhook_url: row.get(7)?,
        enabled: row.get(8)?,
        last_triggered_at: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn row_to_dashboard(row: &rusqlite::Row<'_>) -> rusqlite::Result<Dashboard> {
    let config_json: String = row.get(3)?;
    let config = serde_json::from_str(&config_json).unwrap_or(serde_json::Value::Null);
    Ok(Dashboard {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        config,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

// ── Key/id generation ─────────────────────────────────────────────────────

/// Ingestion credential: `cn_` + 48 hex chars (24 random bytes).
fn generate_api_key() -> String {
    let bytes: [u8; 24] = rand::random();
    format!("cn_{}", hex::encode(bytes))
}

/// Random hex token of `n` bytes.
pub fn generate_token(n: usize) -> String {
    let mut bytes = vec![0u8; n];
    rand::Rng::fill(&mut rand::thread_rng(), bytes.as_mut_slice());
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, MetaStore) {
        let dir = tempdir().unwrap();
        let store = MetaStore::open(&dir.path().join("meta.db"), Encryptor::disabled()).unwrap();
        (dir, store)
    }

    #[test]
    fn api_key_shape() {
        let key = generate_api_key();
        assert!(key.starts_with("cn_"));
        assert_eq!(key.len(), 3 + 48);
    }

    #[test]
    fn migrations_rerun_is_noop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.db");
        let store = MetaStore::open(&path, Encryptor::disabled()).unwrap();
        store.create_project("p1", "Test").unwrap();
        drop(store);

        // Reopening runs the migration pass again; existing data survives.
        let store = MetaStore::open(&path, Encryptor::disabled()).unwrap();
        assert_eq!(store.list_projects().unwrap().len(), 1);
    }

    #[test]
    fn project_lookup_by_api_key() {
        let (_dir, store) = store();
        let project = store.create_project("p1", "Test").unwrap();
        let found = store.get_project_by_api_key(&project.api_key).unwrap().unwrap();
        assert_eq!(found.id, "p1");
        assert!(store.get_project_by_api_key("cn_bogus").unwrap().is_none());
    }

    #[test]
    fn event_name_upsert_keeps_user_override() {
        let (_dir, store) = store();
        store.create_project("p1", "Test").unwrap();

        store.set_event_name("p1", "fp1", "Clicked thing", None, Some(0.8)).unwrap();
        store.override_event_name("p1", "fp1", "Checkout button").unwrap();

        // A second AI write must not clobber the override.
        store.set_event_name("p1", "fp1", "Clicked other thing", Some("src/App.tsx"), Some(0.9)).unwrap();

        let en = store.get_event_name("p1", "fp1").unwrap().unwrap();
        assert_eq!(en.ai_name, "Clicked other thing");
        assert_eq!(en.user_name.as_deref(), Some("Checkout button"));
        assert_eq!(en.display_name(), "Checkout button");
    }

    #[test]
    fn override_twice_is_idempotent() {
        let (_dir, store) = store();
        store.create_project("p1", "Test").unwrap();
        store.set_event_name("p1", "fp1", "AI name", None, None).unwrap();

        store.override_event_name("p1", "fp1", "Manual name").unwrap();
        store.override_event_name("p1", "fp1", "Manual name").unwrap();

        let en = store.get_event_name("p1", "fp1").unwrap().unwrap();
        assert_eq!(en.user_name.as_deref(), Some("Manual name"));
    }

    #[test]
    fn batch_get_event_names() {
        let (_dir, store) = store();
        store.create_project("p1", "Test").unwrap();
        store.set_event_name("p1", "fp1", "One", None, None).unwrap();
        store.set_event_name("p1", "fp2", "Two", None, None).unwrap();

        let map = store
            .batch_get_event_names("p1", &["fp1".into(), "fp2".into(), "fp3".into()])
            .unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["fp1"].ai_name, "One");
    }

    #[test]
    fn llm_config_round_trip() {
        let (_dir, store) = store();
        store.create_project("p1", "Test").unwrap();
        store
            .set_llm_config(&LlmConfig {
                project_id: "p1".into(),
                provider: "anthropic".into(),
                api_key: Some("sk-ant-test".into()),
                model: "claude-haiku-4-5".into(),
                base_url: None,
            })
            .unwrap();

        let config = store.get_llm_config("p1").unwrap().unwrap();
        assert_eq!(config.provider, "anthropic");
        assert_eq!(config.api_key.as_deref(), Some("sk-ant-test"));
        assert!(store.get_llm_config("p2").unwrap().is_none());
    }

    #[test]
    fn funnel_steps_round_trip() {
        let (_dir, store) = store();
        store.create_project("p1", "Test").unwrap();
        let steps = vec![
            FunnelStep { event_type: "pageview".into(), event_name: String::new() },
            FunnelStep { event_type: "click".into(), event_name: "Add to Cart".into() },
        ];
        store.create_funnel("f1", "p1", "Checkout", &steps).unwrap();

        let funnel = store.get_funnel("p1", "f1").unwrap().unwrap();
        assert_eq!(funnel.steps.len(), 2);
        assert_eq!(funnel.steps[1].event_name, "Add to Cart");
        assert!(store.get_funnel("p1", "missing").unwrap().is_none());
    }

    #[test]
    fn alert_triggered_update() {
        let (_dir, store) = store();
        store.create_project("p1", "Test").unwrap();
        let alert = Alert {
            id: "a1".into(),
            project_id: "p1".into(),
            name: "Error spike".into(),
            metric: "error_count".into(),
            event_name: None,
            threshold: 5,
            window_minutes: 60,
            webhook_url: "https://hooks.example.com/x".into(),
            enabled: true,
            last_triggered_at: None,
            created_at: Utc::now(),
        };
        store.create_alert(&alert).unwrap();

        let now = Utc::now();
        store.update_alert_triggered("a1", now).unwrap();
        let alerts = store.list_all_enabled_alerts().unwrap();
        assert_eq!(alerts.len(), 1);
        let got = alerts[0].last_triggered_at.unwrap();
        assert!((got - now).num_seconds().abs() < 2);
    }

    #[test]
    fn disabled_alerts_not_listed_for_scheduler() {
        let (_dir, store) = store();
        store.create_project("p1", "Test").unwrap();
        let mut alert = Alert {
            id: "a1".into(),
            project_id: "p1".into(),
            name: "Quiet".into(),
            metric: "pageview_count".into(),
            event_name: None,
            threshold: 100,
            window_minutes: 30,
            webhook_url: "https://hooks.example.com/x".into(),
            enabled: true,
            last_triggered_at: None,
            created_at: Utc::now(),
        };
        store.create_alert(&alert).unwrap();
        store.update_alert("p1", "a1", false, 100, "https://hooks.example.com/x").unwrap();
        assert!(store.list_all_enabled_alerts().unwrap().is_empty());

        alert.id = "a2".into();
        store.create_alert(&alert).unwrap();
        assert_eq!(store.list_all_enabled_alerts().unwrap().len(), 1);
    }

    #[test]
    fn user_session_expiry() {
        let (_dir, store) = store();
        let user_id = store.create_user("a@b.c", "hash").unwrap();

        let live = store
            .create_user_session(&user_id, Utc::now() + chrono::Duration::hours(1))
            .unwrap();
        assert_eq!(store.get_user_session(&live).unwrap(), Some(user_id.clone()));

        let expired = store
            .create_user_session(&user_id, Utc::now() - chrono::Duration::hours(1))
            .unwrap();
        assert_eq!(store.get_user_session(&expired).unwrap(), None);

        store.delete_user_session(&live).unwrap();
        assert_eq!(store.get_user_session(&live).unwrap(), None);
    }
}
