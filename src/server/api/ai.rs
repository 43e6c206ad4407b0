// AI endpoints - analytics chat and funnel suggestions
//
// Both require a configured LLM provider. The chat system prompt is
// assembled fresh per request from recent analytics (7-day trends and top
// pages, 30-day top named events); the caller supplies the conversation
// history.

use std::fmt::Write as _;

use axum::extract::State;
use axum::Json;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::naming::chat::{self, ChatMessage};
use crate::server::auth::SessionProject;
use crate::server::AppState;
use crate::storage::analytics::{EventNameStat, PageStat, TrendPoint};
use crate::storage::meta::LlmConfig;

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

/// POST /api/v1/ai/chat
pub async fn chat(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
    Json(body): Json<ChatBody>,
) -> AppResult<Json<serde_json::Value>> {
    let config = require_llm_config(&state, &project.id)?;

    let now = Utc::now();
    let week_ago = now - Duration::days(7);
    let month_ago = now - Duration::days(30);

    // Context gathering is best-effort; chat still works on an empty store.
    let trends = state
        .events
        .query_trends(&project.id, "day", week_ago, now)
        .unwrap_or_default();
    let pages = state
        .events
        .query_top_pages(&project.id, week_ago, now, 10)
        .unwrap_or_default();
    let top_events = state
        .events
        .query_top_event_names(&project.id, Some(month_ago), Some(now), 10)
        .unwrap_or_default();

    let system_msg = build_analytics_system_prompt(&trends, &pages, &top_events);

    let mut history = body.history;
    history.push(ChatMessage {
        role: "user".to_string(),
        content: body.message,
    });

    let reply = chat::chat_with_history(&config, &system_msg, &history)
        .await
        .map_err(|e| {
            tracing::error!("ai chat: {e:#}");
            AppError::Upstream(format!("AI request failed: {e}"))
        })?;

    Ok(Json(json!({"reply": reply})))
}

/// POST /api/v1/funnels/suggest — propose funnels from the top observed
/// 2- and 3-step sequences of the last 30 days.
pub async fn suggest_funnels(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
) -> AppResult<Json<serde_json::Value>> {
    let config = require_llm_config(&state, &project.id)?;

    let now = Utc::now();
    let sequences = state
        .events
        .query_top_sequences(&project.id, now - Duration::days(30), now, 20)?;
    if sequences.is_empty() {
        return Err(AppError::Validation(
            "Not enough event data to suggest funnels. Record more events first.".to_string(),
        ));
    }

    let suggestions = chat::suggest_funnels(&config, &sequences)
        .await
        .map_err(|e| {
            tracing::error!("suggesting funnels: {e:#}");
            AppError::Upstream("AI suggestion failed".to_string())
        })?;

    Ok(Json(json!({"suggestions": suggestions})))
}

fn require_llm_config(state: &AppState, project_id: &str) -> AppResult<LlmConfig> {
    match state.meta.get_llm_config(project_id)? {
        Some(config) if !config.provider.is_empty() => Ok(config),
        _ => Err(AppError::Validation(
            "LLM not configured. Go to Settings to configure an AI provider.".to_string(),
        )),
    }
}

fn build_analytics_system_prompt(
    trends: &[TrendPoint],
    pages: &[PageStat],
    events: &[EventNameStat],
) -> String {
    let mut prompt = String::from(
        "You are an analytics assistant embedded in ClickNook, a product analytics dashboard. \
         You have access to real analytics data from the user's product. \
         Be concise, direct, and actionable. Use plain paragraphs - no markdown headers or bullet lists unless explicitly asked. \
         Focus on insights that help the user understand their product's performance and what to improve.\n\n",
    );

    if !trends.is_empty() {
        let total: i64 = trends.iter().map(|p| p.count).sum();
        let _ = writeln!(
            prompt,
            "EVENT VOLUME (last 7 days): {total} total events across {} days",
            trends.len()
        );
        if trends.len() >= 2 {
            let last = trends[trends.len() - 1].count;
            let prev = trends[trends.len() - 2].count;
            if prev > 0 {
                let pct = 100 * (last - prev) / prev;
                let _ = writeln!(prompt, "Recent trend: {pct:+}% day-over-day");
            }
        }
        prompt.push('\n');
    }

    if !pages.is_empty() {
        prompt.push_str("TOP PAGES (last 7 days):\n");
        for (i, page) in pages.iter().enumerate() {
            let _ = writeln!(
                prompt,
                "{}. {} - {} views, {} sessions",
                i + 1,
                page.path,
                page.views,
                page.sessions
            );
        }
        prompt.push('\n');
    }

    if !events.is_empty() {
        prompt.push_str("TOP NAMED EVENTS (last 30 days):\n");
        for (i, event) in events.iter().enumerate() {
            let _ = writeln!(prompt, "{}. {} - {} occurrences", i + 1, event.name, event.count);
        }
        prompt.push('\n');
    }

    prompt.push_str("Answer questions about this data. Provide insights and concrete recommendations.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn system_prompt_summarizes_context() {
        let trends = vec![
            TrendPoint { bucket: "2026-03-01".into(), count: 100 },
            TrendPoint { bucket: "2026-03-02".into(), count: 150 },
        ];
        let pages = vec![PageStat {
            path: "/pricing".into(),
            title: "Pricing".into(),
            views: 40,
            sessions: 25,
        }];
        let events = vec![EventNameStat {
            name: "User clicked 'Buy'".into(),
            count: 12,
            last_seen: Utc::now(),
        }];

        let prompt = build_analytics_system_prompt(&trends, &pages, &events);
        assert!(prompt.contains("250 total events across 2 days"));
        assert!(prompt.contains("Recent trend: +50% day-over-day"));
        assert!(prompt.contains("1. /pricing - 40 views, 25 sessions"));
        assert!(prompt.contains("1. User clicked 'Buy' - 12 occurrences"));
    }

    #[test]
    fn system_prompt_on_empty_store() {
        let prompt = build_analytics_system_prompt(&[], &[], &[]);
        assert!(prompt.contains("analytics assistant"));
        assert!(!prompt.contains("EVENT VOLUME"));
    }
}
