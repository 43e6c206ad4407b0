//! # clicknook
//!
//! Self-hosted product analytics with AI-named events.
//!
//! Browser clients batch interaction events to `/api/v1/events`; the server
//! validates and fingerprints them into a columnar DuckDB store, a worker
//! pool resolves each distinct interacting element to a human-readable name
//! through a configurable LLM provider, and the dashboard queries trends,
//! funnels, retention, paths, heatmaps, sessions and user timelines over
//! the same store.
//!
//! Module map:
//! - [`fingerprint`] — element identity digests
//! - [`ingest`] — payload validation and record building
//! - [`naming`] — worker pool, cache, LLM provider adapters, chat/suggest
//! - [`source`] — source-index matching for naming enrichment
//! - [`storage`] — DuckDB event store, SQLite metadata, field encryption
//! - [`scheduler`] — threshold-alert evaluation loop
//! - [`server`] — HTTP surface (axum) and the live SSE feed

pub mod cli;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod ingest;
pub mod naming;
pub mod scheduler;
pub mod server;
pub mod source;
pub mod storage;
