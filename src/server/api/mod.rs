// HTTP API module - JSON endpoints for the dashboard and the SDK
//
// One file per endpoint group. Handlers parse query/body params, call into
// the stores, and shape JSON responses; all domain logic lives below them.

pub mod ai;
pub mod alerts;
pub mod dashboards;
pub mod events;
pub mod flags;
pub mod funnels;
pub mod heatmap;
pub mod ingest;
pub mod names;
pub mod pages;
pub mod paths;
pub mod properties;
pub mod retention;
pub mod sessions;
pub mod settings;
pub mod trends;
pub mod users;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

/// Common `start`/`end` query parameters (RFC3339).
///
/// Query structs spell these two fields out instead of flattening this in:
/// serde_urlencoded cannot mix flattened structs with numeric fields.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// Resolve with a default lookback of `days` ending now.
    pub fn resolve_days(&self, days: i64) -> (DateTime<Utc>, DateTime<Utc>) {
        resolve_days(self.start, self.end, days)
    }
}

/// Resolve optional bounds with a default lookback of `days` ending now.
pub fn resolve_days(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    days: i64,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = end.unwrap_or_else(Utc::now);
    let start = start.unwrap_or(end - Duration::days(days));
    (start, end)
}

/// Random 16-byte hex id for new resources.
pub fn generate_id() -> String {
    crate::storage::meta::generate_token(16)
}
