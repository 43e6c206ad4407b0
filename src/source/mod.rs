//! Source-code matching for the naming pipeline
//!
//! When a project has a connected repository, the source index (file path →
//! extracted selectors) is scored against the DOM context of a naming job.
//! The best-matching file's content is fetched from the code host and handed
//! to the LLM as extra grounding.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use crate::naming::SourceMatcher;
use crate::storage::MetaStore;

/// Snippets longer than this get cut before they reach the LLM.
const MAX_SNIPPET_BYTES: usize = 3000;

/// Minimum score for a match to count.
const MIN_SCORE: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct SourceMatch {
    pub file_path: String,
    pub score: f64,
}

/// Matches DOM elements against the project's source index and fetches file
/// content from the connected repository.
pub struct Matcher {
    meta: Arc<MetaStore>,
    client: reqwest::Client,
}

impl Matcher {
    pub fn new(meta: Arc<MetaStore>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("clicknook/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("building source http client");
        Self { meta, client }
    }

    /// Best-scoring indexed file for the given DOM context, or `None` below
    /// the score floor.
    pub fn match_element(
        &self,
        project_id: &str,
        element_id: &str,
        element_classes: &str,
        parent_path: &str,
    ) -> Result<Option<SourceMatch>> {
        let entries = self.meta.list_source_index(project_id)?;

        let mut best: Option<SourceMatch> = None;
        for entry in entries {
            let score = match_score(&entry.selectors, element_id, element_classes, parent_path);
            if best.as_ref().map_or(true, |b| score > b.score) {
                best = Some(SourceMatch {
                    file_path: entry.file_path,
                    score,
                });
            }
        }

        Ok(best.filter(|b| b.score >= MIN_SCORE))
    }

    /// Fetch one file's content from the connected repository.
    pub async fn fetch_file(&self, project_id: &str, file_path: &str) -> Result<String> {
        let Some(conn) = self.meta.get_source_connection(project_id)? else {
            bail!("no source connection for project");
        };

        let url = format!(
            "https://api.github.com/repos/{}/{}/contents/{}?ref={}",
            conn.repo_owner, conn.repo_name, file_path, conn.default_branch
        );
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&conn.access_token)
            .header("Accept", "application/vnd.github.raw+json")
            .send()
            .await
            .context("fetching source file")?;

        let status = resp.status();
        if !status.is_success() {
            bail!("source host returned {status} for {file_path}");
        }
        resp.text().await.context("reading source file body")
    }

    /// Verify a connection by listing the repository root.
    pub async fn verify_connection(&self, owner: &str, repo: &str, token: &str, branch: &str) -> Result<()> {
        let url = format!("https://api.github.com/repos/{owner}/{repo}/contents/?ref={branch}");
        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .context("verifying source connection")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("source host returned {status}");
        }
        Ok(())
    }
}

#[async_trait]
impl SourceMatcher for Matcher {
    async fn match_and_fetch(
        &self,
        project_id: &str,
        element_id: &str,
        element_classes: &str,
        parent_path: &str,
    ) -> Option<(String, String)> {
        let matched = self
            .match_element(project_id, element_id, element_classes, parent_path)
            .ok()??;

        let content = match self.fetch_file(project_id, &matched.file_path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!("fetching {}: {e:#}", matched.file_path);
                return None;
            }
        };

        Some((truncate_snippet(&content), matched.file_path))
    }
}

/// Score how well an index entry's selectors cover the DOM context:
/// element id +0.5, each matching class +0.2, each matching path segment
/// +0.1. Matching is case-insensitive substring containment.
fn match_score(selectors: &str, element_id: &str, element_classes: &str, parent_path: &str) -> f64 {
    let haystack = selectors.to_lowercase();
    let mut score = 0.0;

    if !element_id.is_empty() && haystack.contains(&element_id.to_lowercase()) {
        score += 0.5;
    }

    for class in element_classes.split_whitespace() {
        if haystack.contains(&class.to_lowercase()) {
            score += 0.2;
        }
    }

    for part in parent_path.split('>') {
        let part = part.trim();
        if !part.is_empty() && haystack.contains(&part.to_lowercase()) {
            score += 0.1;
        }
    }

    score
}

/// Cut a snippet to at most 3000 bytes on a char boundary, marking the cut.
fn truncate_snippet(content: &str) -> String {
    if content.len() <= MAX_SNIPPET_BYTES {
        return content.to_string();
    }
    let mut end = MAX_SNIPPET_BYTES;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n// ... truncated", &content[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Encryptor;
    use tempfile::tempdir;

    #[test]
    fn score_weights() {
        let selectors = "submit-btn btn btn-primary form checkout-form";
        let score = match_score(selectors, "submit-btn", "btn btn-primary", "form>div");
        // id (0.5) + two classes (0.4) + one path part (0.1)
        assert!((score - 1.0).abs() < 1e-9);

        assert_eq!(match_score("unrelated", "submit-btn", "", ""), 0.0);
    }

    #[test]
    fn score_is_case_insensitive() {
        let score = match_score("SubmitBtn", "submitbtn", "", "");
        assert!(score > 0.0);
    }

    #[test]
    fn match_requires_minimum_score() {
        let dir = tempdir().unwrap();
        let meta = Arc::new(MetaStore::open(&dir.path().join("meta.db"), Encryptor::disabled()).unwrap());
        meta.create_project("p1", "Test").unwrap();
        meta.upsert_source_index("p1", "src/Checkout.tsx", Some("Checkout"), "checkout-form submit-btn", "h1")
            .unwrap();
        meta.upsert_source_index("p1", "src/Other.tsx", Some("Other"), "sidebar nav", "h2")
            .unwrap();

        let matcher = Matcher::new(meta);
        let matched = matcher
            .match_element("p1", "submit-btn", "btn", "form")
            .unwrap()
            .unwrap();
        assert_eq!(matched.file_path, "src/Checkout.tsx");

        assert!(matcher
            .match_element("p1", "zzz", "", "")
            .unwrap()
            .is_none());
    }

    #[test]
    fn snippet_truncation_is_char_safe() {
        let long = "é".repeat(2000); // 4000 bytes
        let out = truncate_snippet(&long);
        assert!(out.ends_with("// ... truncated"));
        assert!(out.len() <= MAX_SNIPPET_BYTES + 20);

        let short = "short file";
        assert_eq!(truncate_snippet(short), "short file");
    }
}
