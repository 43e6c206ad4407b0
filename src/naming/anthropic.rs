//! Messages provider ("anthropic")

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde_json::json;

use super::provider::{build_prompt, clean_name, naming_http_client, NamingRequest, NamingResult, Provider, SYSTEM_PROMPT};

pub struct Anthropic {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl Anthropic {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        let model = if model.is_empty() {
            "claude-sonnet-4-5".to_string()
        } else {
            model
        };
        let base_url = if base_url.is_empty() {
            "https://api.anthropic.com".to_string()
        } else {
            base_url.trim_end_matches('/').to_string()
        };
        Self {
            api_key,
            model,
            base_url,
            client: naming_http_client(),
        }
    }
}

#[async_trait]
impl Provider for Anthropic {
    async fn generate_event_name(&self, req: &NamingRequest) -> anyhow::Result<NamingResult> {
        let body = json!({
            "model": self.model,
            "max_tokens": 100,
            "system": SYSTEM_PROMPT,
            "messages": [
                {"role": "user", "content": build_prompt(req)},
            ],
        });

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .context("calling anthropic")?;

        let status = resp.status();
        let text = resp.text().await.context("reading anthropic response")?;
        if !status.is_success() {
            bail!("anthropic returned {status}: {text}");
        }

        let parsed: serde_json::Value =
            serde_json::from_str(&text).context("parsing anthropic response")?;
        let content = parsed["content"][0]["text"]
            .as_str()
            .filter(|s| !s.trim().is_empty());
        let Some(content) = content else {
            bail!("no content in response");
        };

        Ok(NamingResult {
            name: clean_name(content),
            confidence: 0.8,
            source_file: req.source_file.clone(),
        })
    }
}
