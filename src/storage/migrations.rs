//! Embedded SQL migrations
//!
//! Migration files are compiled into the binary and tracked per-database in a
//! `schema_migrations` table keyed by filename, so each file executes exactly
//! once. Re-running the set is a no-op.

/// A single migration file.
pub struct Migration {
    pub name: &'static str,
    pub sql: &'static str,
}

/// Migrations for the columnar event store, applied in order.
pub const DUCKDB_MIGRATIONS: &[Migration] = &[Migration {
    name: "001_events.sql",
    sql: include_str!("migrations/duckdb/001_events.sql"),
}];

/// Migrations for the relational metadata store, applied in order.
pub const SQLITE_MIGRATIONS: &[Migration] = &[Migration {
    name: "001_init.sql",
    sql: include_str!("migrations/sqlite/001_init.sql"),
}];

pub const TRACKING_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    filename   TEXT PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
)";
