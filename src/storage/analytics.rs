//! Analytical queries over the event store
//!
//! Funnels, retention, trends, paths, heatmaps, sequences, pages and user
//! aggregates. The SQL relies on DuckDB's date_trunc, window functions and
//! JSON path extraction; session-scoped ordering is always done with
//! `ROW_NUMBER() OVER (PARTITION BY session_id ORDER BY timestamp)`.
//!
//! Funnel correctness note: step k (k ≥ 2) requires `e.timestamp > s.ts`
//! against step k-1's first-match time. Dropping that predicate counts
//! sessions that performed the steps out of order.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use duckdb::params;
use serde::Serialize;

use super::events::{EventStore, FunnelStep};

#[derive(Debug, Clone, Serialize)]
pub struct TrendPoint {
    pub bucket: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendSeries {
    pub name: String,
    pub data: Vec<TrendPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageStat {
    pub path: String,
    pub title: String,
    pub views: i64,
    pub sessions: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub distinct_id: String,
    pub event_count: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunnelResult {
    pub step: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetentionCohort {
    pub cohort: String,
    pub size: i64,
    pub retention: Vec<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunnelCohortStep {
    pub step: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunnelCohortResult {
    pub cohort: String,
    pub steps: Vec<FunnelCohortStep>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventSequence {
    pub steps: Vec<FunnelStep>,
    pub session_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventNameStat {
    pub name: String,
    pub count: i64,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PathTransition {
    pub from: String,
    pub to: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeatmapPoint {
    pub x: f64,
    pub y: f64,
    pub count: i64,
}

/// Clamp an interval string to the date_trunc whitelist. Interval strings
/// are interpolated into SQL, so anything outside the whitelist falls back
/// to the given default.
fn valid_interval<'a>(interval: &'a str, allowed: &[&str], default: &'a str) -> &'a str {
    if allowed.contains(&interval) {
        interval
    } else {
        default
    }
}

impl EventStore {
    /// Time-bucketed event counts. Unknown intervals default to `hour`.
    pub fn query_trends(
        &self,
        project_id: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TrendPoint>> {
        let bucket = valid_interval(interval, &["minute", "hour", "day", "week", "month"], "hour");

        let sql = format!(
            "SELECT CAST(date_trunc('{bucket}', timestamp) AS VARCHAR) AS bucket, COUNT(*) AS count
             FROM events
             WHERE project_id = ? AND timestamp >= ? AND timestamp <= ?
             GROUP BY bucket
             ORDER BY bucket"
        );

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![project_id, start, end], |row| {
            Ok(TrendPoint {
                bucket: row.get(0)?,
                count: row.get(1)?,
            })
        })?;
        let points = rows.collect::<duckdb::Result<Vec<_>>>()?;
        Ok(points)
    }

    /// Multi-series trends split by a dimension. Keeps the top 8 series by
    /// total count over the range, in first-seen order.
    pub fn query_trends_breakdown(
        &self,
        project_id: &str,
        interval: &str,
        group_by: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TrendSeries>> {
        let bucket = valid_interval(interval, &["minute", "hour", "day", "week", "month"], "hour");
        let series_expr = match group_by {
            "event_type" => "event_type",
            "url_path" => "url_path",
            _ => "COALESCE(event_name, event_type)",
        };

        let sql = format!(
            "SELECT
                CAST(date_trunc('{bucket}', timestamp) AS VARCHAR) AS bucket,
                COALESCE(CAST({series_expr} AS VARCHAR), '') AS series,
                COUNT(*) AS count
             FROM events
             WHERE project_id = ? AND timestamp >= ? AND timestamp <= ?
               AND {series_expr} IS NOT NULL AND CAST({series_expr} AS VARCHAR) != ''
             GROUP BY bucket, series
             ORDER BY bucket, series"
        );

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![project_id, start, end], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut series_data: HashMap<String, Vec<TrendPoint>> = HashMap::new();
        let mut series_order: Vec<String> = Vec::new();
        for row in rows {
            let (bucket, series, count) = row?;
            if !series_data.contains_key(&series) {
                series_order.push(series.clone());
            }
            series_data
                .entry(series)
                .or_default()
                .push(TrendPoint { bucket, count });
        }

        // Pick the top 8 series by total volume.
        let mut totals: Vec<(String, i64)> = series_data
            .iter()
            .map(|(name, points)| (name.clone(), points.iter().map(|p| p.count).sum()))
            .collect();
        totals.sort_by(|a, b| b.1.cmp(&a.1));
        let top: std::collections::HashSet<String> =
            totals.into_iter().take(8).map(|(name, _)| name).collect();

        let result = series_order
            .into_iter()
            .filter(|name| top.contains(name))
            .map(|name| {
                let data = series_data.remove(&name).unwrap_or_default();
                TrendSeries { name, data }
            })
            .collect();
        Ok(result)
    }

    /// Top named events by frequency.
    pub fn query_top_event_names(
        &self,
        project_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<EventNameStat>> {
        let limit = if limit == 0 { 50 } else { limit };
        let mut sql = String::from(
            "SELECT event_name, COUNT(*) AS count, MAX(timestamp) AS last_seen
             FROM events WHERE project_id = ? AND event_name IS NOT NULL AND event_name != ''",
        );
        let mut args: Vec<Box<dyn duckdb::ToSql>> = vec![Box::new(project_id.to_string())];
        if let Some(start) = start {
            sql.push_str(" AND timestamp >= ?");
            args.push(Box::new(start));
        }
        if let Some(end) = end {
            sql.push_str(" AND timestamp <= ?");
            args.push(Box::new(end));
        }
        sql.push_str(" GROUP BY event_name ORDER BY count DESC LIMIT ?");
        args.push(Box::new(limit as i64));

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let arg_refs: Vec<&dyn duckdb::ToSql> = args.iter().map(|a| a.as_ref()).collect();
        let rows = stmt.query_map(arg_refs.as_slice(), |row| {
            Ok(EventNameStat {
                name: row.get(0)?,
                count: row.get(1)?,
                last_seen: row.get(2)?,
            })
        })?;
        let stats = rows.collect::<duckdb::Result<Vec<_>>>()?;
        Ok(stats)
    }

    /// Top pages by pageview volume, with distinct session counts.
    pub fn query_top_pages(
        &self,
        project_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PageStat>> {
        let limit = if limit == 0 { 50 } else { limit };
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT
                url_path,
                MAX(COALESCE(page_title, '')) AS page_title,
                COUNT(*) AS views,
                COUNT(DISTINCT session_id) AS sessions
             FROM events
             WHERE project_id = ? AND event_type = 'pageview'
               AND timestamp >= ? AND timestamp <= ?
               AND url_path IS NOT NULL AND url_path != ''
             GROUP BY url_path
             ORDER BY views DESC
             LIMIT ?",
        )?;
        let rows = stmt.query_map(params![project_id, start, end, limit as i64], |row| {
            Ok(PageStat {
                path: row.get(0)?,
                title: row.get(1)?,
                views: row.get(2)?,
                sessions: row.get(3)?,
            })
        })?;
        let stats = rows.collect::<duckdb::Result<Vec<_>>>()?;
        Ok(stats)
    }

    /// Distinct top-level keys across the properties JSON column.
    pub fn query_property_keys(&self, project_id: &str) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT unnest(json_keys(properties)) AS key
             FROM events
             WHERE project_id = ? AND properties IS NOT NULL AND CAST(properties AS VARCHAR) != '{}'
             ORDER BY key",
        )?;
        let rows = stmt.query_map(params![project_id], |row| row.get::<_, String>(0))?;
        let keys = rows.collect::<duckdb::Result<Vec<_>>>()?;
        Ok(keys)
    }

    /// Distinct values for one property key, cast to strings.
    pub fn query_property_values(&self, project_id: &str, key: &str, limit: usize) -> Result<Vec<String>> {
        let limit = if limit == 0 { 100 } else { limit };
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT CAST(json_extract(properties, '$.' || ?) AS VARCHAR) AS val
             FROM events
             WHERE project_id = ? AND properties IS NOT NULL
               AND json_extract(properties, '$.' || ?) IS NOT NULL
             ORDER BY val
             LIMIT ?",
        )?;
        let rows = stmt.query_map(params![key, project_id, key, limit as i64], |row| {
            row.get::<_, String>(0)
        })?;
        let values = rows.collect::<duckdb::Result<Vec<_>>>()?;
        Ok(values)
    }

    /// Paginated user profiles grouped by distinct id, plus the total
    /// distinct-user count for the range.
    pub fn query_users(
        &self,
        project_id: &str,
        limit: usize,
        offset: usize,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<(Vec<UserProfile>, i64)> {
        let limit = if limit == 0 { 50 } else { limit };

        let mut where_clause =
            String::from("project_id = ? AND distinct_id IS NOT NULL AND distinct_id != ''");
        let mut args: Vec<Box<dyn duckdb::ToSql>> = vec![Box::new(project_id.to_string())];
        if let Some(start) = start {
            where_clause.push_str(" AND timestamp >= ?");
            args.push(Box::new(start));
        }
        if let Some(end) = end {
            where_clause.push_str(" AND timestamp <= ?");
            args.push(Box::new(end));
        }

        let conn = self.lock();
        let arg_refs: Vec<&dyn duckdb::ToSql> = args.iter().map(|a| a.as_ref()).collect();
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(DISTINCT distinct_id) FROM events WHERE {where_clause}"),
            arg_refs.as_slice(),
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT distinct_id, COUNT(*) AS event_count,
                    MIN(timestamp) AS first_seen, MAX(timestamp) AS last_seen
             FROM events WHERE {where_clause}
             GROUP BY distinct_id ORDER BY last_seen DESC
             LIMIT ? OFFSET ?"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut page_args = args;
        page_args.push(Box::new(limit as i64));
        page_args.push(Box::new(offset as i64));
        let page_refs: Vec<&dyn duckdb::ToSql> = page_args.iter().map(|a| a.as_ref()).collect();
        let rows = stmt.query_map(page_refs.as_slice(), |row| {
            Ok(UserProfile {
                distinct_id: row.get(0)?,
                event_count: row.get(1)?,
                first_seen: row.get(2)?,
                last_seen: row.get(3)?,
            })
        })?;
        let users = rows.collect::<duckdb::Result<Vec<_>>>()?;
        Ok((users, total))
    }

    /// Session-based funnel with strict temporal ordering between steps.
    pub fn query_funnel(
        &self,
        project_id: &str,
        steps: &[FunnelStep],
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<FunnelResult>> {
        if steps.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::new();
        let mut args: Vec<Box<dyn duckdb::ToSql>> = Vec::new();

        for (i, step) in steps.iter().enumerate() {
            let n = i + 1;
            if i == 0 {
                sql.push_str("WITH ");
            } else {
                sql.push_str(", ");
            }
            sql.push_str(&format!("step{n} AS (\n"));
            if i == 0 {
                sql.push_str("  SELECT session_id, MIN(timestamp) AS ts FROM events WHERE project_id = ?");
                args.push(Box::new(project_id.to_string()));
                sql.push_str(" AND event_type = ?");
                args.push(Box::new(step.event_type.clone()));
                if !step.event_name.is_empty() {
                    sql.push_str(" AND event_name = ?");
                    args.push(Box::new(step.event_name.clone()));
                }
                push_time_bounds(&mut sql, &mut args, "timestamp", start, end);
                sql.push_str("\n  GROUP BY session_id\n)\n");
            } else {
                sql.push_str(&format!(
                    "  SELECT e.session_id, MIN(e.timestamp) AS ts FROM events e \
                     JOIN step{} s ON e.session_id = s.session_id WHERE e.project_id = ?",
                    i
                ));
                args.push(Box::new(project_id.to_string()));
                sql.push_str(" AND e.event_type = ?");
                args.push(Box::new(step.event_type.clone()));
                if !step.event_name.is_empty() {
                    sql.push_str(" AND e.event_name = ?");
                    args.push(Box::new(step.event_name.clone()));
                }
                push_time_bounds(&mut sql, &mut args, "e.timestamp", start, end);
                // Strict ordering within the session.
                sql.push_str(" AND e.timestamp > s.ts");
                sql.push_str("\n  GROUP BY e.session_id\n)\n");
            }
        }

        for (i, step) in steps.iter().enumerate() {
            if i > 0 {
                sql.push_str("UNION ALL\n");
            }
            let label = if step.event_name.is_empty() {
                &step.event_type
            } else {
                &step.event_name
            };
            sql.push_str(&format!(
                "SELECT ? AS step, COUNT(*) AS count FROM step{}\n",
                i + 1
            ));
            args.push(Box::new(format!("Step {}: {}", i + 1, label)));
        }

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let arg_refs: Vec<&dyn duckdb::ToSql> = args.iter().map(|a| a.as_ref()).collect();
        let rows = stmt.query_map(arg_refs.as_slice(), |row| {
            Ok(FunnelResult {
                step: row.get(0)?,
                count: row.get(1)?,
            })
        })?;
        let results = rows.collect::<duckdb::Result<Vec<_>>>()?;
        Ok(results)
    }

    /// Funnel results split by session cohort (truncated first-event date).
    pub fn query_funnel_cohorts(
        &self,
        project_id: &str,
        steps: &[FunnelStep],
        interval: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<FunnelCohortResult>> {
        if steps.is_empty() {
            return Ok(Vec::new());
        }
        let interval = valid_interval(interval, &["day", "week", "month"], "week");

        let mut sql = format!(
            "WITH cohorts AS (\n  SELECT session_id, CAST(date_trunc('{interval}', MIN(timestamp)) AS VARCHAR) AS cohort\n  FROM events WHERE project_id = ?"
        );
        let mut args: Vec<Box<dyn duckdb::ToSql>> = vec![Box::new(project_id.to_string())];
        push_time_bounds(&mut sql, &mut args, "timestamp", start, end);
        sql.push_str("\n  GROUP BY session_id\n)\n");

        for (i, step) in steps.iter().enumerate() {
            let n = i + 1;
            sql.push_str(&format!(", step{n} AS (\n"));
            if i == 0 {
                sql.push_str("  SELECT session_id, MIN(timestamp) AS ts FROM events WHERE project_id = ?");
                args.push(Box::new(project_id.to_string()));
                sql.push_str(" AND event_type = ?");
                args.push(Box::new(step.event_type.clone()));
                if !step.event_name.is_empty() {
                    sql.push_str(" AND event_name = ?");
                    args.push(Box::new(step.event_name.clone()));
                }
                push_time_bounds(&mut sql, &mut args, "timestamp", start, end);
                sql.push_str("\n  GROUP BY session_id\n)\n");
            } else {
                sql.push_str(&format!(
                    "  SELECT e.session_id, MIN(e.timestamp) AS ts FROM events e \
                     JOIN step{} s ON e.session_id = s.session_id WHERE e.project_id = ?",
                    i
                ));
                args.push(Box::new(project_id.to_string()));
                sql.push_str(" AND e.event_type = ?");
                args.push(Box::new(step.event_type.clone()));
                if !step.event_name.is_empty() {
                    sql.push_str(" AND e.event_name = ?");
                    args.push(Box::new(step.event_name.clone()));
                }
                push_time_bounds(&mut sql, &mut args, "e.timestamp", start, end);
                sql.push_str(" AND e.timestamp > s.ts");
                sql.push_str("\n  GROUP BY e.session_id\n)\n");
            }
        }

        for (i, step) in steps.iter().enumerate() {
            if i > 0 {
                sql.push_str("UNION ALL\n");
            }
            let label = if step.event_name.is_empty() {
                &step.event_type
            } else {
                &step.event_name
            };
            sql.push_str(&format!(
                "SELECT c.cohort, ? AS step, COUNT(*) AS count FROM step{} s \
                 JOIN cohorts c ON s.session_id = c.session_id GROUP BY c.cohort\n",
                i + 1
            ));
            args.push(Box::new(format!("Step {}: {}", i + 1, label)));
        }
        sql.push_str("ORDER BY cohort, step");

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let arg_refs: Vec<&dyn duckdb::ToSql> = args.iter().map(|a| a.as_ref()).collect();
        let rows = stmt.query_map(arg_refs.as_slice(), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut by_cohort: HashMap<String, Vec<FunnelCohortStep>> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for row in rows {
            let (cohort, step, count) = row?;
            if !by_cohort.contains_key(&cohort) {
                order.push(cohort.clone());
            }
            by_cohort
                .entry(cohort)
                .or_default()
                .push(FunnelCohortStep { step, count });
        }

        let results = order
            .into_iter()
            .map(|cohort| {
                let steps = by_cohort.remove(&cohort).unwrap_or_default();
                FunnelCohortResult { cohort, steps }
            })
            .collect();
        Ok(results)
    }

    /// Cohort retention: one row per first-activity bucket, with distinct
    /// users active i intervals later for i in 0..=periods.
    pub fn query_retention(
        &self,
        project_id: &str,
        interval: &str,
        periods: usize,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RetentionCohort>> {
        let interval = valid_interval(interval, &["day", "week", "month"], "week");
        let periods = if periods == 0 { 8 } else { periods };

        let mut period_cols = String::new();
        for i in 0..=periods {
            period_cols.push_str(&format!(
                ",\n  COUNT(DISTINCT CASE WHEN ua.activity_period = uc.cohort + INTERVAL '{i} {interval}' THEN uc.distinct_id END) AS period_{i}"
            ));
        }

        let sql = format!(
            "WITH user_cohorts AS (
                SELECT distinct_id, date_trunc('{interval}', MIN(timestamp)) AS cohort
                FROM events WHERE project_id = ? AND distinct_id IS NOT NULL AND distinct_id != ''
                  AND timestamp >= ? AND timestamp <= ?
                GROUP BY distinct_id
             ),
             user_activity AS (
                SELECT DISTINCT e.distinct_id, date_trunc('{interval}', e.timestamp) AS activity_period
                FROM events e WHERE e.project_id = ? AND e.distinct_id IS NOT NULL AND e.distinct_id != ''
                  AND e.timestamp >= ? AND e.timestamp <= ?
             )
             SELECT CAST(uc.cohort AS VARCHAR) AS cohort, COUNT(DISTINCT uc.distinct_id) AS cohort_size{period_cols}
             FROM user_cohorts uc
             LEFT JOIN user_activity ua ON uc.distinct_id = ua.distinct_id
             GROUP BY uc.cohort ORDER BY uc.cohort"
        );

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![project_id, start, end, project_id, start, end],
            |row| {
                let cohort: String = row.get(0)?;
                let size: i64 = row.get(1)?;
                let mut retention = Vec::with_capacity(periods + 1);
                for i in 0..=periods {
                    retention.push(row.get::<_, i64>(2 + i)?);
                }
                Ok(RetentionCohort {
                    cohort,
                    size,
                    retention,
                })
            },
        )?;
        let cohorts = rows.collect::<duckdb::Result<Vec<_>>>()?;
        Ok(cohorts)
    }

    /// Most common 2- and 3-step event sequences across sessions. Pairs need
    /// at least 2 distinct sessions, triples at least 3.
    pub fn query_top_sequences(
        &self,
        project_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<EventSequence>> {
        let limit = if limit == 0 { 20 } else { limit };
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "WITH ordered AS (
                SELECT session_id, event_type, COALESCE(event_name, '') AS event_name,
                       ROW_NUMBER() OVER (PARTITION BY session_id ORDER BY timestamp) AS rn
                FROM events
                WHERE project_id = ? AND timestamp >= ? AND timestamp <= ?
             ),
             pairs AS (
                SELECT a.event_type AS t1, a.event_name AS n1,
                       b.event_type AS t2, b.event_name AS n2,
                       COUNT(DISTINCT a.session_id) AS cnt
                FROM ordered a JOIN ordered b ON a.session_id = b.session_id AND b.rn = a.rn + 1
                GROUP BY a.event_type, a.event_name, b.event_type, b.event_name
                HAVING cnt >= 2
             ),
             triples AS (
                SELECT a.event_type AS t1, a.event_name AS n1,
                       b.event_type AS t2, b.event_name AS n2,
                       c.event_type AS t3, c.event_name AS n3,
                       COUNT(DISTINCT a.session_id) AS cnt
                FROM ordered a
                  JOIN ordered b ON a.session_id = b.session_id AND b.rn = a.rn + 1
                  JOIN ordered c ON a.session_id = c.session_id AND c.rn = a.rn + 2
                GROUP BY a.event_type, a.event_name, b.event_type, b.event_name, c.event_type, c.event_name
                HAVING cnt >= 3
             )
             SELECT t1, n1, t2, n2, '' AS t3, '' AS n3, cnt FROM pairs
             UNION ALL
             SELECT t1, n1, t2, n2, t3, n3, cnt FROM triples
             ORDER BY cnt DESC
             LIMIT ?",
        )?;
        let rows = stmt.query_map(params![project_id, start, end, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, i64>(6)?,
            ))
        })?;

        let mut sequences = Vec::new();
        for row in rows {
            let (t1, n1, t2, n2, t3, n3, cnt) = row?;
            let mut steps = vec![
                FunnelStep { event_type: t1, event_name: n1 },
                FunnelStep { event_type: t2, event_name: n2 },
            ];
            if !t3.is_empty() {
                steps.push(FunnelStep { event_type: t3, event_name: n3 });
            }
            sequences.push(EventSequence {
                steps,
                session_count: cnt,
            });
        }
        Ok(sequences)
    }

    /// Page-to-page transitions over pageview events, most travelled first.
    pub fn query_paths(
        &self,
        project_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PathTransition>> {
        let limit = if limit == 0 { 20 } else { limit };
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "WITH ordered AS (
                SELECT session_id, url_path,
                       ROW_NUMBER() OVER (PARTITION BY session_id ORDER BY timestamp) AS rn
                FROM events WHERE project_id = ? AND event_type = 'pageview'
                  AND timestamp BETWEEN ? AND ?
             ),
             transitions AS (
                SELECT a.url_path AS from_path, b.url_path AS to_path
                FROM ordered a JOIN ordered b ON a.session_id = b.session_id AND b.rn = a.rn + 1
             )
             SELECT from_path, to_path, COUNT(*) AS cnt
             FROM transitions
             GROUP BY from_path, to_path
             ORDER BY cnt DESC
             LIMIT ?",
        )?;
        let rows = stmt.query_map(params![project_id, start, end, limit as i64], |row| {
            Ok(PathTransition {
                from: row.get(0)?,
                to: row.get(1)?,
                count: row.get(2)?,
            })
        })?;
        let transitions = rows.collect::<duckdb::Result<Vec<_>>>()?;
        Ok(transitions)
    }

    /// Click density for one page: normalized client_x/client_y from the
    /// properties column, rounded to two decimals and grouped.
    pub fn query_heatmap(
        &self,
        project_id: &str,
        url_path: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HeatmapPoint>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT
                ROUND(CAST(json_extract(properties, '$.client_x') AS DOUBLE), 2) AS x,
                ROUND(CAST(json_extract(properties, '$.client_y') AS DOUBLE), 2) AS y,
                COUNT(*) AS cnt
             FROM events
             WHERE project_id = ? AND event_type = 'click'
               AND url_path = ?
               AND json_extract(properties, '$.client_x') IS NOT NULL
               AND timestamp BETWEEN ? AND ?
             GROUP BY x, y
             ORDER BY cnt DESC",
        )?;
        let rows = stmt.query_map(params![project_id, url_path, start, end], |row| {
            Ok(HeatmapPoint {
                x: row.get(0)?,
                y: row.get(1)?,
                count: row.get(2)?,
            })
        })?;
        let points = rows.collect::<duckdb::Result<Vec<_>>>()?;
        Ok(points)
    }
}

fn push_time_bounds(
    sql: &mut String,
    args: &mut Vec<Box<dyn duckdb::ToSql>>,
    column: &str,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) {
    if let Some(start) = start {
        sql.push_str(&format!(" AND {column} >= ?"));
        args.push(Box::new(start));
    }
    if let Some(end) = end {
        sql.push_str(&format!(" AND {column} <= ?"));
        args.push(Box::new(end));
    }
}
