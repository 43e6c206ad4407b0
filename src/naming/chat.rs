//! Analytics chat and funnel suggestions
//!
//! Both features reuse the provider configuration but talk to the backends
//! directly with chat-shaped requests. The caller holds the conversation
//! history; the core contract is purely request → reply.

use std::fmt::Write as _;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::storage::analytics::EventSequence;
use crate::storage::meta::LlmConfig;
use crate::storage::FunnelStep;

/// A single message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// "user" or "assistant"
    pub role: String,
    pub content: String,
}

/// A funnel definition proposed by the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestedFunnel {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<FunnelStep>,
}

/// Chat calls get a generous timeout; users are waiting, but models are slow.
fn chat_http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .context("building chat http client")
}

/// Send a multi-turn chat to the configured LLM provider and return the
/// assistant's reply.
pub async fn chat_with_history(
    config: &LlmConfig,
    system_msg: &str,
    history: &[ChatMessage],
) -> Result<String> {
    match config.provider.as_str() {
        "openai" => openai_chat(config, system_msg, history, 0.5, 1200).await,
        "anthropic" => anthropic_chat(config, system_msg, history, 1200).await,
        "ollama" => ollama_chat(config, system_msg, history, 0.5, 1200).await,
        other => bail!("unsupported provider: {other}"),
    }
}

/// Ask the LLM to propose funnel definitions from observed event sequences.
pub async fn suggest_funnels(
    config: &LlmConfig,
    sequences: &[EventSequence],
) -> Result<Vec<SuggestedFunnel>> {
    let system_msg = r#"You are an analytics funnel design assistant. Given a list of common event sequences observed in user sessions, suggest 2-4 meaningful conversion funnels.

Return ONLY valid JSON in this format:
{"suggestions": [{"name": "Funnel Name", "description": "What this funnel measures", "steps": [{"event_type": "pageview", "event_name": "optional name"}, ...]}]}

Rules:
- Each funnel must have 2-5 steps
- Focus on sequences that represent meaningful user journeys (signup, purchase, onboarding, etc.)
- Use descriptive funnel names
- The description should explain what conversion this funnel tracks
- event_type must be one of: pageview, click, submit, input, custom
- event_name can be empty string if the sequence only uses event_type"#;

    let user_msg = build_suggest_prompt(sequences);
    let history = [ChatMessage {
        role: "user".to_string(),
        content: user_msg,
    }];

    let raw = match config.provider.as_str() {
        "openai" => openai_chat(config, system_msg, &history, 0.3, 800).await?,
        "anthropic" => anthropic_chat(config, system_msg, &history, 800).await?,
        "ollama" => ollama_chat(config, system_msg, &history, 0.3, 800).await?,
        other => bail!("unsupported provider: {other}"),
    };

    let cleaned = extract_json(&raw);

    #[derive(Deserialize)]
    struct Suggestions {
        suggestions: Vec<SuggestedFunnel>,
    }
    let parsed: Suggestions = serde_json::from_str(cleaned)
        .with_context(|| format!("parsing LLM response (raw: {cleaned})"))?;
    Ok(parsed.suggestions)
}

fn build_suggest_prompt(sequences: &[EventSequence]) -> String {
    let mut prompt =
        String::from("Here are the most common event sequences observed in user sessions:\n\n");
    for (i, seq) in sequences.iter().enumerate() {
        let steps: Vec<String> = seq
            .steps
            .iter()
            .map(|s| {
                if s.event_name.is_empty() {
                    s.event_type.clone()
                } else {
                    format!("{}:{}", s.event_type, s.event_name)
                }
            })
            .collect();
        let _ = writeln!(
            prompt,
            "{}. {} (seen in {} sessions)",
            i + 1,
            steps.join(" -> "),
            seq.session_count
        );
    }
    prompt.push_str("\nSuggest 2-4 meaningful conversion funnels based on these patterns.");
    prompt
}

async fn openai_chat(
    config: &LlmConfig,
    system_msg: &str,
    history: &[ChatMessage],
    temperature: f64,
    max_tokens: u32,
) -> Result<String> {
    let api_key = config.api_key.clone().unwrap_or_default();
    let model = if config.model.is_empty() {
        "gpt-4o-mini"
    } else {
        &config.model
    };
    let base_url = base_url_or(config, "https://api.openai.com/v1");

    let mut messages = vec![json!({"role": "system", "content": system_msg})];
    for m in history {
        messages.push(json!({"role": m.role, "content": m.content}));
    }

    let resp = chat_http_client()?
        .post(format!("{base_url}/chat/completions"))
        .bearer_auth(api_key)
        .json(&json!({
            "model": model,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
        }))
        .send()
        .await
        .context("calling openai")?;

    let status = resp.status();
    let text = resp.text().await.context("reading openai response")?;
    if !status.is_success() {
        bail!("openai returned {status}: {text}");
    }

    let parsed: serde_json::Value = serde_json::from_str(&text).context("parsing response")?;
    match parsed["choices"][0]["message"]["content"].as_str() {
        Some(content) => Ok(content.trim().to_string()),
        None => bail!("no choices in response"),
    }
}

async fn anthropic_chat(
    config: &LlmConfig,
    system_msg: &str,
    history: &[ChatMessage],
    max_tokens: u32,
) -> Result<String> {
    let api_key = config.api_key.clone().unwrap_or_default();
    let model = if config.model.is_empty() {
        "claude-haiku-4-5"
    } else {
        &config.model
    };
    let base_url = base_url_or(config, "https://api.anthropic.com");

    let messages: Vec<_> = history
        .iter()
        .map(|m| json!({"role": m.role, "content": m.content}))
        .collect();

    let resp = chat_http_client()?
        .post(format!("{base_url}/v1/messages"))
        .header("x-api-key", api_key)
        .header("anthropic-version", "2023-06-01")
        .json(&json!({
            "model": model,
            "max_tokens": max_tokens,
            "system": system_msg,
            "messages": messages,
        }))
        .send()
        .await
        .context("calling anthropic")?;

    let status = resp.status();
    let text = resp.text().await.context("reading anthropic response")?;
    if !status.is_success() {
        bail!("anthropic returned {status}: {text}");
    }

    let parsed: serde_json::Value = serde_json::from_str(&text).context("parsing response")?;
    match parsed["content"][0]["text"].as_str() {
        Some(content) => Ok(content.trim().to_string()),
        None => bail!("no content in response"),
    }
}

async fn ollama_chat(
    config: &LlmConfig,
    system_msg: &str,
    history: &[ChatMessage],
    temperature: f64,
    max_tokens: u32,
) -> Result<String> {
    let model = if config.model.is_empty() {
        "llama3"
    } else {
        &config.model
    };
    let base_url = base_url_or(config, "http://localhost:11434");

    // Local generate has no chat endpoint; flatten the conversation.
    let mut prompt = format!("{system_msg}\n\n");
    for m in history {
        let speaker = if m.role == "user" { "User" } else { "Assistant" };
        let _ = writeln!(prompt, "{speaker}: {}\n", m.content);
    }

    let resp = chat_http_client()?
        .post(format!("{base_url}/api/generate"))
        .json(&json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "options": {"temperature": temperature, "num_predict": max_tokens},
        }))
        .send()
        .await
        .context("calling ollama")?;

    let status = resp.status();
    let text = resp.text().await.context("reading ollama response")?;
    if !status.is_success() {
        bail!("ollama returned {status}: {text}");
    }

    let parsed: serde_json::Value = serde_json::from_str(&text).context("parsing response")?;
    match parsed["response"].as_str() {
        Some(content) => Ok(content.trim().to_string()),
        None => bail!("no response field in ollama output"),
    }
}

fn base_url_or<'a>(config: &'a LlmConfig, default: &'a str) -> &'a str {
    match &config.base_url {
        Some(url) if !url.is_empty() => url.trim_end_matches('/'),
        _ => default,
    }
}

/// Strip leading prose and markdown code fences from LLM output, leaving
/// the JSON body.
pub fn extract_json(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(idx) = s.find("```json") {
        s = &s[idx + 7..];
    } else if let Some(idx) = s.find("```") {
        s = &s[idx + 3..];
    }
    if let Some(idx) = s.rfind("```") {
        s = &s[..idx];
    }
    s.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::provider::clean_name;

    #[test]
    fn extract_json_plain() {
        assert_eq!(extract_json(r#"{"a": 1}"#), r#"{"a": 1}"#);
    }

    #[test]
    fn extract_json_fenced() {
        let raw = "Here you go:\n```json\n{\"suggestions\": []}\n```\nHope that helps!";
        // Trailing prose after the closing fence is cut with it.
        assert_eq!(extract_json(raw), "{\"suggestions\": []}");
    }

    #[test]
    fn extract_json_bare_fence() {
        let raw = "```\n{\"a\": 1}\n```";
        assert_eq!(extract_json(raw), "{\"a\": 1}");
    }

    #[test]
    fn suggest_prompt_renders_sequences() {
        let sequences = vec![EventSequence {
            steps: vec![
                FunnelStep { event_type: "pageview".into(), event_name: String::new() },
                FunnelStep { event_type: "click".into(), event_name: "Add to Cart".into() },
            ],
            session_count: 12,
        }];
        let prompt = build_suggest_prompt(&sequences);
        assert!(prompt.contains("1. pageview -> click:Add to Cart (seen in 12 sessions)"));
    }

    #[test]
    fn suggested_funnel_parses_from_extracted_json() {
        let raw = r#"```json
{"suggestions": [{"name": "Checkout", "description": "Purchase flow", "steps": [{"event_type": "pageview", "event_name": ""}, {"event_type": "click", "event_name": "Buy"}]}]}
```"#;
        #[derive(Deserialize)]
        struct Suggestions {
            suggestions: Vec<SuggestedFunnel>,
        }
        let parsed: Suggestions = serde_json::from_str(extract_json(raw)).unwrap();
        assert_eq!(parsed.suggestions.len(), 1);
        assert_eq!(parsed.suggestions[0].steps[1].event_name, "Buy");
    }

    #[test]
    fn clean_name_reexported_for_adapters() {
        // Shared post-processing: outer quotes removed, inner kept.
        assert_eq!(clean_name("\"User clicked 'Buy'\""), "User clicked 'Buy'");
    }
}
