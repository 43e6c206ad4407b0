//! Event ingestion
//!
//! Wire types for the SDK batch payload plus the translation into storage
//! records. Validation and normalization live in [`validator`]; the HTTP
//! handler that drives this module is `server::api::ingest`.

pub mod validator;

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::fingerprint::compute_fingerprint;
use crate::naming::NamingRequest;
use crate::storage::NewEvent;

pub use validator::{validate_payload, ValidationError};

/// One event as sent by the browser SDK.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestEvent {
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub element_tag: String,
    #[serde(default)]
    pub element_id: String,
    #[serde(default)]
    pub element_classes: String,
    #[serde(default)]
    pub element_text: String,
    #[serde(default)]
    pub aria_label: String,
    #[serde(default)]
    pub data_attributes: HashMap<String, String>,
    #[serde(default)]
    pub parent_path: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub url_path: String,
    #[serde(default)]
    pub page_title: String,
    #[serde(default)]
    pub referrer: String,
    #[serde(default)]
    pub screen_width: i32,
    #[serde(default)]
    pub screen_height: i32,
    /// Client timestamp in unix millis; 0 means "stamp on the server".
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub properties: Option<serde_json::Value>,
}

/// The batch payload: a session plus 1..=100 events.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestPayload {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub distinct_id: Option<String>,
    #[serde(default)]
    pub events: Vec<IngestEvent>,
}

fn opt(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

impl IngestEvent {
    /// Fingerprint of the interacting element this event targets.
    pub fn fingerprint(&self) -> String {
        compute_fingerprint(
            &self.element_tag,
            &self.element_id,
            &self.element_classes,
            &self.parent_path,
            &self.url_path,
        )
    }

    /// Resolve the client timestamp, falling back to server time for
    /// zero/garbage values.
    pub fn resolved_timestamp(&self) -> DateTime<Utc> {
        if self.timestamp == 0 {
            return Utc::now();
        }
        match Utc.timestamp_millis_opt(self.timestamp) {
            chrono::LocalResult::Single(ts) => ts,
            _ => Utc::now(),
        }
    }

    /// Build the storage record for this event.
    pub fn to_record(&self, project_id: &str, payload: &IngestPayload, user_agent: &str) -> NewEvent {
        NewEvent {
            project_id: project_id.to_string(),
            session_id: payload.session_id.clone(),
            distinct_id: payload.distinct_id.clone().filter(|d| !d.is_empty()),
            event_type: self.event_type.clone(),
            fingerprint: self.fingerprint(),
            element_tag: opt(&self.element_tag),
            element_id: opt(&self.element_id),
            element_classes: opt(&self.element_classes),
            element_text: opt(&self.element_text),
            aria_label: opt(&self.aria_label),
            data_attributes: if self.data_attributes.is_empty() {
                None
            } else {
                Some(self.data_attributes.clone())
            },
            parent_path: opt(&self.parent_path),
            url: self.url.clone(),
            url_path: self.url_path.clone(),
            page_title: opt(&self.page_title),
            referrer: opt(&self.referrer),
            screen_width: (self.screen_width > 0).then_some(self.screen_width),
            screen_height: (self.screen_height > 0).then_some(self.screen_height),
            user_agent: opt(user_agent),
            timestamp: self.resolved_timestamp(),
            properties: self.properties.clone(),
        }
    }

    /// Build the naming request submitted for non-pageview events.
    pub fn to_naming_request(&self) -> NamingRequest {
        NamingRequest {
            element_tag: self.element_tag.clone(),
            element_id: self.element_id.clone(),
            element_classes: self.element_classes.clone(),
            element_text: self.element_text.clone(),
            aria_label: self.aria_label.clone(),
            parent_path: self.parent_path.clone(),
            url: self.url.clone(),
            url_path: self.url_path.clone(),
            page_title: self.page_title.clone(),
            source_code: String::new(),
            source_file: String::new(),
        }
    }
}
