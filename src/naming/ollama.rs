//! Local generate provider ("ollama")

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde_json::json;

use super::provider::{build_prompt, clean_name, naming_http_client, NamingRequest, NamingResult, Provider, SYSTEM_PROMPT};

pub struct Ollama {
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl Ollama {
    pub fn new(model: String, base_url: String) -> Self {
        let model = if model.is_empty() {
            "llama3".to_string()
        } else {
            model
        };
        let base_url = if base_url.is_empty() {
            "http://localhost:11434".to_string()
        } else {
            base_url.trim_end_matches('/').to_string()
        };
        Self {
            model,
            base_url,
            client: naming_http_client(),
        }
    }
}

#[async_trait]
impl Provider for Ollama {
    async fn generate_event_name(&self, req: &NamingRequest) -> anyhow::Result<NamingResult> {
        let body = json!({
            "model": self.model,
            "prompt": format!("{SYSTEM_PROMPT}\n\n{}", build_prompt(req)),
            "stream": false,
            "options": {
                "temperature": 0.2,
                "num_predict": 100,
            },
        });

        let resp = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .context("calling ollama")?;

        let status = resp.status();
        let text = resp.text().await.context("reading ollama response")?;
        if !status.is_success() {
            bail!("ollama returned {status}: {text}");
        }

        let parsed: serde_json::Value =
            serde_json::from_str(&text).context("parsing ollama response")?;
        let Some(response) = parsed["response"].as_str() else {
            bail!("no response field in ollama output");
        };

        // Local models ramble; keep the first line only.
        let mut name = clean_name(response);
        if let Some(idx) = name.find('\n') {
            name.truncate(idx);
        }

        Ok(NamingResult {
            name,
            confidence: 0.6,
            source_file: req.source_file.clone(),
        })
    }
}
