//! Columnar event store (DuckDB)
//!
//! Append-mostly storage for interaction events plus the backfill UPDATE the
//! naming engine issues. The analytical query set lives in
//! [`super::analytics`]; this file owns the schema, batch insert, filtered
//! listing, counting, and the unnamed-fingerprint scan.
//!
//! The DuckDB connection is not `Sync`, so the handle lives behind a `Mutex`.
//! Queries are short; contention is acceptable for a single-writer embedded
//! store.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use duckdb::{params, Connection, OptionalExt};
use serde::{Deserialize, Serialize};

use super::migrations::{DUCKDB_MIGRATIONS, TRACKING_TABLE_SQL};

/// An immutable observation. `event_name` is the only field ever updated
/// after insert (by the naming backfill).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub project_id: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distinct_id: Option<String>,
    pub event_type: String,
    pub fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_classes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_attributes: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_path: Option<String>,
    pub url: String,
    pub url_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_width: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_height: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Value>,
}

/// A record ready for insertion; the store assigns `id` and `received_at`.
#[derive(Debug, Clone, Default)]
pub struct NewEvent {
    pub project_id: String,
    pub session_id: String,
    pub distinct_id: Option<String>,
    pub event_type: String,
    pub fingerprint: String,
    pub element_tag: Option<String>,
    pub element_id: Option<String>,
    pub element_classes: Option<String>,
    pub element_text: Option<String>,
    pub aria_label: Option<String>,
    pub data_attributes: Option<HashMap<String, String>>,
    pub parent_path: Option<String>,
    pub url: String,
    pub url_path: String,
    pub page_title: Option<String>,
    pub referrer: Option<String>,
    pub screen_width: Option<i32>,
    pub screen_height: Option<i32>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub properties: Option<serde_json::Value>,
}

/// Filter for the general-purpose event listing.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub project_id: String,
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

/// One funnel step: an event type plus an optional resolved name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunnelStep {
    pub event_type: String,
    #[serde(default)]
    pub event_name: String,
}

/// One representative row per unnamed fingerprint, for backfill submission.
#[derive(Debug, Clone)]
pub struct UnnamedFingerprint {
    pub fingerprint: String,
    pub element_tag: String,
    pub element_id: String,
    pub element_classes: String,
    pub element_text: String,
    pub aria_label: String,
    pub parent_path: String,
    pub url: String,
    pub url_path: String,
    pub page_title: String,
}

pub struct EventStore {
    pub(super) conn: Mutex<Connection>,
}

impl EventStore {
    /// Open (or create) the event database and run pending migrations.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("opening duckdb")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory duckdb")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    pub(super) fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned mutex means a panic mid-query; propagating the poison
        // would take the whole store down for every caller.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(TRACKING_TABLE_SQL)
            .context("creating schema_migrations table")?;

        for m in DUCKDB_MIGRATIONS {
            let applied: i64 = conn.query_row(
                "SELECT COUNT(*) FROM schema_migrations WHERE filename = ?",
                params![m.name],
                |row| row.get(0),
            )?;
            if applied > 0 {
                continue;
            }
            conn.execute_batch(m.sql)
                .with_context(|| format!("executing migration {}", m.name))?;
            conn.execute(
                "INSERT INTO schema_migrations (filename) VALUES (?)",
                params![m.name],
            )?;
        }
        Ok(())
    }

    /// Insert a batch of events inside a single transaction. All-or-nothing:
    /// a failure on any row rolls the whole batch back.
    pub fn insert_events(&self, events: &[NewEvent]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction().context("beginning transaction")?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO events (
                    project_id, session_id, distinct_id, event_type, fingerprint,
                    element_tag, element_id, element_classes, element_text, aria_label,
                    data_attributes, parent_path,
                    url, url_path, page_title, referrer,
                    screen_width, screen_height, user_agent,
                    timestamp, received_at, properties
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )?;

            let now = Utc::now();
            for e in events {
                let data_attrs = e
                    .data_attributes
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?;
                let props = e.properties.as_ref().map(|p| p.to_string());

                stmt.execute(params![
                    e.project_id,
                    e.session_id,
                    e.distinct_id,
                    e.event_type,
                    e.fingerprint,
                    e.element_tag,
                    e.element_id,
                    e.element_classes,
                    e.element_text,
                    e.aria_label,
                    data_attrs,
                    e.parent_path,
                    e.url,
                    e.url_path,
                    e.page_title,
                    e.referrer,
                    e.screen_width,
                    e.screen_height,
                    e.user_agent,
                    e.timestamp,
                    now,
                    props,
                ])
                .context("inserting event")?;
            }
        }
        tx.commit().context("committing event batch")?;
        Ok(())
    }

    /// General-purpose filtered listing, newest first.
    pub fn query_events(&self, f: &EventFilter) -> Result<Vec<Event>> {
        let mut sql = String::from(
            "SELECT
                CAST(id AS VARCHAR), project_id, session_id, distinct_id, event_type, fingerprint, event_name,
                element_tag, element_id, element_classes, element_text, aria_label,
                CAST(data_attributes AS VARCHAR), parent_path,
                url, url_path, page_title, referrer,
                screen_width, screen_height, user_agent,
                timestamp, received_at, CAST(properties AS VARCHAR)
             FROM events WHERE project_id = ?",
        );
        let mut args: Vec<Box<dyn duckdb::ToSql>> = vec![Box::new(f.project_id.clone())];

        if let Some(v) = &f.event_type {
            sql.push_str(" AND event_type = ?");
            args.push(Box::new(v.clone()));
        }
        if let Some(v) = &f.event_name {
            sql.push_str(" AND event_name = ?");
            args.push(Box::new(v.clone()));
        }
        if let Some(v) = &f.fingerprint {
            sql.push_str(" AND fingerprint = ?");
            args.push(Box::new(v.clone()));
        }
        if let Some(v) = &f.session_id {
            sql.push_str(" AND session_id = ?");
            args.push(Box::new(v.clone()));
        }
        if let Some(v) = &f.distinct_id {
            sql.push_str(" AND distinct_id = ?");
            args.push(Box::new(v.clone()));
        }
        if let (Some(key), Some(value)) = (&f.property_key, &f.property_value) {
            sql.push_str(" AND json_extract_string(properties, '$.' || ?) = ?");
            args.push(Box::new(key.clone()));
            args.push(Box::new(value.clone()));
        }
        if let Some(start) = f.start {
            sql.push_str(" AND timestamp >= ?");
            args.push(Box::new(start));
        }
        if let Some(end) = f.end {
            sql.push_str(" AND timestamp <= ?");
            args.push(Box::new(end));
        }

        sql.push_str(" ORDER BY timestamp DESC LIMIT ?");
        let limit = f.limit.filter(|&n| n > 0).unwrap_or(100);
        args.push(Box::new(limit as i64));

        if let Some(offset) = f.offset.filter(|&n| n > 0) {
            sql.push_str(" OFFSET ?");
            args.push(Box::new(offset as i64));
        }

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let arg_refs: Vec<&dyn duckdb::ToSql> = args.iter().map(|a| a.as_ref()).collect();
        let rows = stmt.query_map(arg_refs.as_slice(), row_to_event)?;
        let events = rows.collect::<duckdb::Result<Vec<_>>>()?;
        Ok(events)
    }

    /// Count events matching the optional type/name/since filters. Used by
    /// the alert scheduler.
    pub fn count_events(
        &self,
        project_id: &str,
        event_type: Option<&str>,
        event_name: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Result<i64> {
        let mut sql = String::from("SELECT COUNT(*) FROM events WHERE project_id = ?");
        let mut args: Vec<Box<dyn duckdb::ToSql>> = vec![Box::new(project_id.to_string())];

        if let Some(v) = event_type {
            sql.push_str(" AND event_type = ?");
            args.push(Box::new(v.to_string()));
        }
        if let Some(v) = event_name {
            sql.push_str(" AND event_name = ?");
            args.push(Box::new(v.to_string()));
        }
        if let Some(since) = since {
            sql.push_str(" AND timestamp >= ?");
            args.push(Box::new(since));
        }

        let conn = self.lock();
        let arg_refs: Vec<&dyn duckdb::ToSql> = args.iter().map(|a| a.as_ref()).collect();
        let count = conn.query_row(&sql, arg_refs.as_slice(), |row| row.get(0))?;
        Ok(count)
    }

    /// One representative event per unnamed non-pageview fingerprint, for
    /// the backfill pass after a provider change.
    pub fn unnamed_fingerprints(&self, project_id: &str) -> Result<Vec<UnnamedFingerprint>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT fingerprint,
                    COALESCE(element_tag, ''), COALESCE(element_id, ''), COALESCE(element_classes, ''),
                    COALESCE(element_text, ''), COALESCE(aria_label, ''), COALESCE(parent_path, ''),
                    url, COALESCE(url_path, ''), COALESCE(page_title, '')
             FROM events
             WHERE project_id = ? AND event_type != 'pageview'
               AND (event_name IS NULL OR event_name = '')
             GROUP BY ALL",
        )?;
        let rows = stmt.query_map(params![project_id], |row| {
            Ok(UnnamedFingerprint {
                fingerprint: row.get(0)?,
                element_tag: row.get(1)?,
                element_id: row.get(2)?,
                element_classes: row.get(3)?,
                element_text: row.get(4)?,
                aria_label: row.get(5)?,
                parent_path: row.get(6)?,
                url: row.get(7)?,
                url_path: row.get(8)?,
                page_title: row.get(9)?,
            })
        })?;
        let fingerprints = rows.collect::<duckdb::Result<Vec<_>>>()?;
        Ok(fingerprints)
    }

    /// Attach a resolved name to every historical row with this fingerprint
    /// that does not have one yet.
    pub fn backfill_event_name(&self, project_id: &str, fingerprint: &str, name: &str) -> Result<()> {
        self.lock().execute(
            "UPDATE events SET event_name = ? WHERE project_id = ? AND fingerprint = ? AND event_name IS NULL",
            params![name, project_id, fingerprint],
        )?;
        Ok(())
    }

    /// Flush the WAL into the main database file, making it safe to copy.
    pub fn checkpoint(&self) -> Result<()> {
        self.lock().execute_batch("CHECKPOINT")?;
        Ok(())
    }

    /// Last inserted event's name for a fingerprint, if any. Cheap existence
    /// probe used by tests and the naming engine's diagnostics.
    pub fn event_name_for_fingerprint(&self, project_id: &str, fingerprint: &str) -> Result<Option<String>> {
        let conn = self.lock();
        let name: Option<Option<String>> = conn
            .query_row(
                "SELECT event_name FROM events WHERE project_id = ? AND fingerprint = ? LIMIT 1",
                params![project_id, fingerprint],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name.flatten())
    }
}

fn row_to_event(row: &duckdb::Row<'_>) -> duckdb::Result<Event> {
    let data_attrs_json: Option<String> = row.get(12)?;
    let props_json: Option<String> = row.get(23)?;

    Ok(Event {
        id: row.get(0)?,
        project_id: row.get(1)?,
        session_id: row.get(2)?,
        distinct_id: row.get(3)?,
        event_type: row.get(4)?,
        fingerprint: row.get(5)?,
        event_name: row.get(6)?,
        element_tag: row.get(7)?,
        element_id: row.get(8)?,
        element_classes: row.get(9)?,
        element_text: row.get(10)?,
        aria_label: row.get(11)?,
        data_attributes: data_attrs_json.and_then(|s| serde_json::from_str(&s).ok()),
        parent_path: row.get(13)?,
        url: row.get(14)?,
        url_path: row.get::<_, Option<String>>(15)?.unwrap_or_default(),
        page_title: row.get(16)?,
        referrer: row.get(17)?,
        screen_width: row.get(18)?,
        screen_height: row.get(19)?,
        user_agent: row.get(20)?,
        timestamp: row.get(21)?,
        received_at: row.get(22)?,
        properties: props_json.and_then(|s| serde_json::from_str(&s).ok()),
    })
}

#[cfg(test)]
pub(crate) fn test_event(
    project_id: &str,
    session_id: &str,
    event_type: &str,
    timestamp: DateTime<Utc>,
) -> NewEvent {
    NewEvent {
        project_id: project_id.to_string(),
        session_id: session_id.to_string(),
        event_type: event_type.to_string(),
        fingerprint: "abcdef0123456789".to_string(),
        url: "https://example.com/".to_string(),
        url_path: "/".to_string(),
        timestamp,
        ..Default::default()
    }
}
