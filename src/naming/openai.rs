//! Chat-completions provider ("openai")

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde_json::json;

use super::provider::{build_prompt, clean_name, naming_http_client, NamingRequest, NamingResult, Provider, SYSTEM_PROMPT};

pub struct OpenAi {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAi {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        let model = if model.is_empty() {
            "gpt-4o-mini".to_string()
        } else {
            model
        };
        let base_url = if base_url.is_empty() {
            "https://api.openai.com/v1".to_string()
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
impl Provider for OpenAi {
    async fn generate_event_name(&self, req: &NamingRequest) -> anyhow::Result<NamingResult> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_prompt(req)},
            ],
            "temperature": 0.2,
            "max_tokens": 100,
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("calling openai")?;

        let status = resp.status();
        let text = resp.text().await.context("reading openai response")?;
        if !status.is_success() {
            bail!("openai returned {status}: {text}");
        }

        let parsed: serde_json::Value =
            serde_json::from_str(&text).context("parsing openai response")?;
        let content = parsed["choices"][0]["message"]["content"]
            .as_str()
            .filter(|s| !s.trim().is_empty());
        let Some(content) = content else {
            bail!("no choices in response");
        };

        Ok(NamingResult {
            name: clean_name(content),
            confidence: 0.8,
            source_file: req.source_file.clone(),
        })
    }
}
