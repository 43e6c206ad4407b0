//! Ingestion payload validation and normalization
//!
//! Validation is all-or-nothing: the first failing event rejects the whole
//! batch and nothing is persisted. Normalization mutates events in place
//! (text truncation, url_path derivation) so the caller stores exactly what
//! was validated.

use thiserror::Error;
use url::Url;

use super::{IngestEvent, IngestPayload};

pub const MAX_BATCH_SIZE: usize = 100;
pub const MAX_TEXT_LENGTH: usize = 500;
pub const MAX_PATH_LENGTH: usize = 1000;

const VALID_EVENT_TYPES: &[&str] = &["click", "pageview", "input", "submit", "custom", "error"];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("empty event batch")]
    EmptyBatch,
    #[error("batch exceeds maximum size of {MAX_BATCH_SIZE} events")]
    BatchTooLarge,
    #[error("session_id is required")]
    MissingSession,
    #[error("event_type is required")]
    MissingType,
    #[error("invalid event_type")]
    InvalidType,
    #[error("url is required")]
    MissingURL,
    #[error("invalid url")]
    InvalidURL,
}

/// Check the incoming ingestion request for required fields and normalize
/// text fields in place.
pub fn validate_payload(payload: &mut IngestPayload) -> Result<(), ValidationError> {
    if payload.events.is_empty() {
        return Err(ValidationError::EmptyBatch);
    }
    if payload.events.len() > MAX_BATCH_SIZE {
        return Err(ValidationError::BatchTooLarge);
    }
    if payload.session_id.is_empty() {
        return Err(ValidationError::MissingSession);
    }
    for event in &mut payload.events {
        validate_event(event)?;
    }
    Ok(())
}

fn validate_event(event: &mut IngestEvent) -> Result<(), ValidationError> {
    if event.event_type.is_empty() {
        return Err(ValidationError::MissingType);
    }
    if !VALID_EVENT_TYPES.contains(&event.event_type.as_str()) {
        return Err(ValidationError::InvalidType);
    }
    if event.url.is_empty() {
        return Err(ValidationError::MissingURL);
    }
    // Absolute URIs only; anything without a scheme fails to parse.
    let parsed = Url::parse(&event.url).map_err(|_| ValidationError::InvalidURL)?;

    // Bound text fields so a misbehaving client cannot bloat storage.
    event.element_text = truncate(&event.element_text, MAX_TEXT_LENGTH);
    event.aria_label = truncate(&event.aria_label, MAX_TEXT_LENGTH);
    event.page_title = truncate(&event.page_title, MAX_TEXT_LENGTH);
    event.parent_path = truncate(&event.parent_path, MAX_PATH_LENGTH);

    if event.url_path.is_empty() {
        event.url_path = parsed.path().to_string();
    }

    Ok(())
}

/// Trim, then cut to at most `max_len` Unicode scalar values. Never splits
/// a code point.
fn truncate(s: &str, max_len: usize) -> String {
    let trimmed = s.trim();
    match trimmed.char_indices().nth(max_len) {
        Some((byte_idx, _)) => trimmed[..byte_idx].to_string(),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_event() -> IngestEvent {
        IngestEvent {
            event_type: "click".to_string(),
            url: "https://example.com/page".to_string(),
            ..Default::default()
        }
    }

    fn valid_payload() -> IngestPayload {
        IngestPayload {
            session_id: "sess-abc123".to_string(),
            distinct_id: None,
            events: vec![valid_event()],
        }
    }

    #[test]
    fn accepts_valid_payload() {
        let mut p = valid_payload();
        assert_eq!(validate_payload(&mut p), Ok(()));
    }

    #[test]
    fn rejects_empty_batch() {
        let mut p = valid_payload();
        p.events.clear();
        assert_eq!(validate_payload(&mut p), Err(ValidationError::EmptyBatch));
    }

    #[test]
    fn batch_boundary_at_100() {
        let mut p = valid_payload();
        p.events = vec![valid_event(); 100];
        assert_eq!(validate_payload(&mut p), Ok(()));

        p.events.push(valid_event());
        assert_eq!(validate_payload(&mut p), Err(ValidationError::BatchTooLarge));
    }

    #[test]
    fn rejects_missing_session() {
        let mut p = valid_payload();
        p.session_id.clear();
        assert_eq!(validate_payload(&mut p), Err(ValidationError::MissingSession));
    }

    #[test]
    fn rejects_missing_type() {
        let mut p = valid_payload();
        p.events[0].event_type.clear();
        assert_eq!(validate_payload(&mut p), Err(ValidationError::MissingType));
    }

    #[test]
    fn rejects_unknown_type() {
        let mut p = valid_payload();
        p.events[0].event_type = "hover".to_string();
        assert_eq!(validate_payload(&mut p), Err(ValidationError::InvalidType));
    }

    #[test]
    fn accepts_all_valid_types() {
        for event_type in ["click", "pageview", "input", "submit", "custom", "error"] {
            let mut p = valid_payload();
            p.events[0].event_type = event_type.to_string();
            assert_eq!(validate_payload(&mut p), Ok(()), "type {event_type} should be valid");
        }
    }

    #[test]
    fn rejects_missing_url() {
        let mut p = valid_payload();
        p.events[0].url.clear();
        assert_eq!(validate_payload(&mut p), Err(ValidationError::MissingURL));
    }

    #[test]
    fn rejects_relative_url() {
        let mut p = valid_payload();
        p.events[0].url = "not a url".to_string();
        assert_eq!(validate_payload(&mut p), Err(ValidationError::InvalidURL));
    }

    #[test]
    fn derives_url_path() {
        let mut p = valid_payload();
        p.events[0].url = "https://e.com/x?q=1".to_string();
        validate_payload(&mut p).unwrap();
        assert_eq!(p.events[0].url_path, "/x");
    }

    #[test]
    fn keeps_explicit_url_path() {
        let mut p = valid_payload();
        p.events[0].url_path = "/custom".to_string();
        validate_payload(&mut p).unwrap();
        assert_eq!(p.events[0].url_path, "/custom");
    }

    #[test]
    fn truncates_long_text_fields() {
        let mut p = valid_payload();
        p.events[0].element_text = "x".repeat(1000);
        p.events[0].parent_path = "y".repeat(2000);
        validate_payload(&mut p).unwrap();
        assert_eq!(p.events[0].element_text.chars().count(), MAX_TEXT_LENGTH);
        assert_eq!(p.events[0].parent_path.chars().count(), MAX_PATH_LENGTH);
    }

    #[test]
    fn truncate_exact_length_unchanged() {
        assert_eq!(truncate(&"a".repeat(500), 500).len(), 500);
        assert_eq!(truncate(&"a".repeat(501), 500).len(), 500);
    }

    #[test]
    fn truncate_is_codepoint_safe() {
        let input = "😀".repeat(600);
        let out = truncate(&input, 500);
        assert_eq!(out.chars().count(), 500);
        assert!(out.chars().all(|c| c == '😀'));
    }

    #[test]
    fn truncate_trims_whitespace() {
        assert_eq!(truncate("  hello  ", 100), "hello");
        assert_eq!(truncate("", 100), "");
    }
}
