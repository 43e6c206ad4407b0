//! Live event stream (server-sent events)
//!
//! One task per connected client polls the event store every two seconds
//! for events newer than the last check and pushes them as a single
//! `data:` frame; a comment heartbeat every fifteen seconds keeps
//! intermediaries from closing the idle connection.
//!
//! There is no server-side queue: if the client stops reading, the channel
//! send fails, the task exits, and the client is expected to reconnect
//! with backoff.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event as SseEvent, Sse};
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::server::auth::SessionProject;
use crate::server::AppState;
use crate::storage::EventFilter;

const POLL_INTERVAL: Duration = Duration::from_secs(2);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const BATCH_LIMIT: usize = 50;

/// GET /api/v1/events/live
pub async fn live_events(
    State(state): State<AppState>,
    SessionProject(project): SessionProject,
) -> Sse<ReceiverStream<Result<SseEvent, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<SseEvent, Infallible>>(8);

    tokio::spawn(async move {
        let mut poll = tokio::time::interval(POLL_INTERVAL);
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        // Skip the immediate first ticks.
        poll.tick().await;
        heartbeat.tick().await;

        let mut last_check = Utc::now();

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if tx.send(Ok(SseEvent::default().comment("heartbeat"))).await.is_err() {
                        return; // client gone
                    }
                }
                _ = poll.tick() => {
                    let now = Utc::now();
                    let events = match state.events.query_events(&EventFilter {
                        project_id: project.id.clone(),
                        start: Some(last_check),
                        end: Some(now),
                        limit: Some(BATCH_LIMIT),
                        ..Default::default()
                    }) {
                        Ok(events) => events,
                        Err(e) => {
                            tracing::warn!("live stream query: {e:#}");
                            continue;
                        }
                    };
                    last_check = now;

                    if events.is_empty() {
                        continue;
                    }
                    let frame = match serde_json::to_string(&events) {
                        Ok(json) => SseEvent::default().data(json),
                        Err(_) => return,
                    };
                    if tx.send(Ok(frame)).await.is_err() {
                        return; // client gone
                    }
                }
            }
        }
    });

    Sse::new(ReceiverStream::new(rx))
}
