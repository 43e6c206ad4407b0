//! LLM provider abstraction
//!
//! A [`Provider`] turns DOM context into a short human-readable event name.
//! Three backends exist: chat-completions ("openai"), messages ("anthropic")
//! and local generate ("ollama"). Providers are stateless values; swapping
//! one at runtime is just replacing the handle in the naming engine.

use async_trait::async_trait;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use crate::storage::meta::LlmConfig;

/// Context needed to generate an event name.
#[derive(Debug, Clone, Default)]
pub struct NamingRequest {
    pub element_tag: String,
    pub element_id: String,
    pub element_classes: String,
    pub element_text: String,
    pub aria_label: String,
    pub parent_path: String,
    pub url: String,
    pub url_path: String,
    pub page_title: String,
    /// Matched source snippet (when a source connection is configured)
    pub source_code: String,
    /// Matched source file path
    pub source_file: String,
}

/// The generated name and its metadata.
#[derive(Debug, Clone)]
pub struct NamingResult {
    pub name: String,
    pub confidence: f64,
    pub source_file: String,
}

#[async_trait]
pub trait Provider: Send + Sync {
    /// Generate a human-readable name for the interaction described by `req`.
    async fn generate_event_name(&self, req: &NamingRequest) -> anyhow::Result<NamingResult>;
}

/// Build the appropriate provider from a stored LLM configuration. Returns
/// `None` when the config is absent or names an unknown provider — naming is
/// then silently disabled.
pub fn provider_from_config(config: Option<&LlmConfig>) -> Option<Arc<dyn Provider>> {
    let config = config?;
    if config.provider.is_empty() {
        return None;
    }

    let api_key = config.api_key.clone().unwrap_or_default();
    let base_url = config.base_url.clone().unwrap_or_default();

    match config.provider.as_str() {
        "openai" => Some(Arc::new(super::openai::OpenAi::new(
            api_key,
            config.model.clone(),
            base_url,
        ))),
        "anthropic" => Some(Arc::new(super::anthropic::Anthropic::new(
            api_key,
            config.model.clone(),
            base_url,
        ))),
        "ollama" => Some(Arc::new(super::ollama::Ollama::new(
            config.model.clone(),
            base_url,
        ))),
        _ => None,
    }
}

/// Shared reqwest client for naming calls: short timeout, no retries —
/// failed jobs are retried by the next ingest of the same fingerprint.
pub(super) fn naming_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("building reqwest client")
}

pub(super) const SYSTEM_PROMPT: &str = "You are an analytics event naming assistant. Given DOM context about a user interaction (element tag, id, classes, text, aria labels, page URL), generate a short, human-readable event name that describes what the user did.

Rules:
- Use the format: \"User [action] '[element description]' on [page/section]\"
- Keep names under 80 characters
- Be specific but concise
- Use the visible text, aria-label, or id to identify the element
- Only output the event name, nothing else";

/// Render the user prompt for a naming request, listing only present fields.
pub(super) fn build_prompt(req: &NamingRequest) -> String {
    let mut prompt = String::from("Generate a human-readable event name for this interaction:\n\n");

    if !req.element_tag.is_empty() {
        let _ = writeln!(prompt, "Element: <{}>", req.element_tag);
    }
    if !req.element_id.is_empty() {
        let _ = writeln!(prompt, "ID: {}", req.element_id);
    }
    if !req.element_classes.is_empty() {
        let _ = writeln!(prompt, "Classes: {}", req.element_classes);
    }
    if !req.element_text.is_empty() {
        let _ = writeln!(prompt, "Text: {}", req.element_text);
    }
    if !req.aria_label.is_empty() {
        let _ = writeln!(prompt, "Aria Label: {}", req.aria_label);
    }
    if !req.parent_path.is_empty() {
        let _ = writeln!(prompt, "DOM Path: {}", req.parent_path);
    }
    if !req.url_path.is_empty() {
        let _ = writeln!(prompt, "Page: {}", req.url_path);
    }
    if !req.page_title.is_empty() {
        let _ = writeln!(prompt, "Page Title: {}", req.page_title);
    }
    if !req.source_code.is_empty() {
        let _ = writeln!(
            prompt,
            "\nSource code (from {}):\n```\n{}\n```",
            req.source_file, req.source_code
        );
    }

    prompt
}

/// Strip wrapping quotes/backticks models like to add.
pub(super) fn clean_name(raw: &str) -> String {
    raw.trim().trim_matches(&['"', '\'', '`'][..]).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_includes_only_present_fields() {
        let req = NamingRequest {
            element_tag: "button".into(),
            element_text: "Place Order".into(),
            url_path: "/checkout".into(),
            ..Default::default()
        };
        let prompt = build_prompt(&req);
        assert!(prompt.contains("Element: <button>"));
        assert!(prompt.contains("Text: Place Order"));
        assert!(prompt.contains("Page: /checkout"));
        assert!(!prompt.contains("Classes:"));
        assert!(!prompt.contains("Source code"));
    }

    #[test]
    fn prompt_embeds_source_snippet() {
        let req = NamingRequest {
            source_code: "<Button>Buy</Button>".into(),
            source_file: "src/Checkout.tsx".into(),
            ..Default::default()
        };
        let prompt = build_prompt(&req);
        assert!(prompt.contains("Source code (from src/Checkout.tsx)"));
        assert!(prompt.contains("<Button>Buy</Button>"));
    }

    #[test]
    fn clean_name_strips_quotes() {
        assert_eq!(clean_name("\"User clicked 'Buy'\""), "User clicked 'Buy'");
        assert_eq!(clean_name("`name`"), "name");
        assert_eq!(clean_name("  plain  "), "plain");
    }

    #[test]
    fn factory_rejects_unknown_and_empty() {
        assert!(provider_from_config(None).is_none());
        let empty = LlmConfig {
            project_id: "p1".into(),
            provider: String::new(),
            api_key: None,
            model: String::new(),
            base_url: None,
        };
        assert!(provider_from_config(Some(&empty)).is_none());
        let unknown = LlmConfig {
            provider: "cohere".into(),
            ..empty
        };
        assert!(provider_from_config(Some(&unknown)).is_none());
    }

    #[test]
    fn factory_builds_known_providers() {
        for provider in ["openai", "anthropic", "ollama"] {
            let config = LlmConfig {
                project_id: "p1".into(),
                provider: provider.into(),
                api_key: Some("key".into()),
                model: String::new(),
                base_url: None,
            };
            assert!(provider_from_config(Some(&config)).is_some(), "{provider}");
        }
    }
}
