//! Threshold-alert scheduler
//!
//! A single background task ticks every five minutes, counts events for each
//! enabled alert's window, and fires the webhook when the count crosses the
//! threshold. Cooldown equals the window: an alert never fires twice within
//! `window_minutes` of its last trigger. `last_triggered_at` is updated even
//! when delivery fails — firing is fire-and-forget.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use crate::storage::{EventStore, MetaStore};

const TICK: Duration = Duration::from_secs(5 * 60);
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

pub struct AlertScheduler {
    events: Arc<EventStore>,
    meta: Arc<MetaStore>,
    client: reqwest::Client,
}

impl AlertScheduler {
    pub fn new(events: Arc<EventStore>, meta: Arc<MetaStore>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .expect("building webhook client");
        Self {
            events,
            meta,
            client,
        }
    }

    /// Run the evaluation loop until the process shuts down.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(TICK);
        // The immediate first tick would evaluate alerts on a half-started
        // server; skip it.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            self.check_alerts().await;
        }
    }

    async fn check_alerts(&self) {
        let alerts = match self.meta.list_all_enabled_alerts() {
            Ok(alerts) => alerts,
            Err(e) => {
                tracing::warn!("alert scheduler: failed to list alerts: {e:#}");
                return;
            }
        };

        for alert in alerts {
            let since = Utc::now() - chrono::Duration::minutes(alert.window_minutes);

            // Map the metric onto an event-store filter.
            let (event_type, event_name) = match alert.metric.as_str() {
                "error_count" => (Some("error"), None),
                "pageview_count" => (Some("pageview"), None),
                "event_count" => (None, alert.event_name.as_deref()),
                other => {
                    tracing::warn!("alert {}: unknown metric {other}", alert.id);
                    continue;
                }
            };

            let count = match self
                .events
                .count_events(&alert.project_id, event_type, event_name, Some(since))
            {
                Ok(count) => count,
                Err(e) => {
                    tracing::warn!("alert scheduler: count failed for {}: {e:#}", alert.id);
                    continue;
                }
            };

            if count <= alert.threshold {
                continue;
            }

            // Cooldown: one firing per window.
            if let Some(last) = alert.last_triggered_at {
                if Utc::now() - last < chrono::Duration::minutes(alert.window_minutes) {
                    continue;
                }
            }

            let payload = json!({
                "alert": alert.name,
                "metric": alert.metric,
                "count": count,
                "threshold": alert.threshold,
                "project_id": alert.project_id,
            });
            match self
                .client
                .post(&alert.webhook_url)
                .json(&payload)
                .send()
                .await
            {
                Ok(resp) => {
                    tracing::info!(
                        "alert {} fired: count={count} threshold={} status={}",
                        alert.name,
                        alert.threshold,
                        resp.status()
                    );
                }
                Err(e) => {
                    tracing::warn!("alert {}: webhook delivery failed: {e}", alert.name);
                }
            }

            // Updated regardless of delivery outcome.
            if let Err(e) = self.meta.update_alert_triggered(&alert.id, Utc::now()) {
                tracing::warn!("alert scheduler: failed to update last_triggered_at: {e:#}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::meta::Alert;
    use crate::storage::{Encryptor, NewEvent};
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, Arc<EventStore>, Arc<MetaStore>) {
        let dir = tempdir().unwrap();
        let meta = Arc::new(MetaStore::open(&dir.path().join("meta.db"), Encryptor::disabled()).unwrap());
        meta.create_project("p1", "Test").unwrap();
        let events = Arc::new(EventStore::open_in_memory().unwrap());
        (dir, events, meta)
    }

    fn error_event(at: chrono::DateTime<Utc>) -> NewEvent {
        NewEvent {
            project_id: "p1".into(),
            session_id: "s1".into(),
            event_type: "error".into(),
            fingerprint: "f".repeat(16),
            url: "https://e.com/".into(),
            url_path: "/".into(),
            timestamp: at,
            ..Default::default()
        }
    }

    fn alert(threshold: i64, window_minutes: i64) -> Alert {
        Alert {
            id: "a1".into(),
            project_id: "p1".into(),
            name: "Error spike".into(),
            metric: "error_count".into(),
            event_name: None,
            threshold,
            window_minutes,
            // Unroutable: delivery fails fast, which is exactly the
            // fire-and-update path under test.
            webhook_url: "http://127.0.0.1:1/hook".into(),
            enabled: true,
            last_triggered_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn fires_above_threshold_and_updates_even_on_delivery_failure() {
        let (_dir, events, meta) = setup();
        let now = Utc::now();
        let batch: Vec<NewEvent> = (0..7).map(|_| error_event(now)).collect();
        events.insert_events(&batch).unwrap();
        meta.create_alert(&alert(5, 60)).unwrap();

        let scheduler = AlertScheduler::new(events.clone(), meta.clone());
        scheduler.check_alerts().await;

        let updated = &meta.list_all_enabled_alerts().unwrap()[0];
        assert!(updated.last_triggered_at.is_some(), "fired despite webhook failure");
    }

    #[tokio::test]
    async fn does_not_fire_at_or_below_threshold() {
        let (_dir, events, meta) = setup();
        let now = Utc::now();
        let batch: Vec<NewEvent> = (0..5).map(|_| error_event(now)).collect();
        events.insert_events(&batch).unwrap();
        meta.create_alert(&alert(5, 60)).unwrap();

        let scheduler = AlertScheduler::new(events.clone(), meta.clone());
        scheduler.check_alerts().await;

        let updated = &meta.list_all_enabled_alerts().unwrap()[0];
        assert!(updated.last_triggered_at.is_none(), "count == threshold must not fire");
    }

    #[tokio::test]
    async fn cooldown_suppresses_refire_within_window() {
        let (_dir, events, meta) = setup();
        let now = Utc::now();
        let batch: Vec<NewEvent> = (0..20).map(|_| error_event(now)).collect();
        events.insert_events(&batch).unwrap();
        meta.create_alert(&alert(5, 60)).unwrap();

        // Fired 30 minutes ago: still cooling down.
        let t0 = now - chrono::Duration::minutes(30);
        meta.update_alert_triggered("a1", t0).unwrap();

        let scheduler = AlertScheduler::new(events.clone(), meta.clone());
        scheduler.check_alerts().await;
        let after = meta.list_all_enabled_alerts().unwrap()[0]
            .last_triggered_at
            .unwrap();
        assert!((after - t0).num_seconds().abs() < 2, "must not refire within the window");

        // 61 minutes after the last fire: fires again.
        let t1 = now - chrono::Duration::minutes(61);
        meta.update_alert_triggered("a1", t1).unwrap();
        scheduler.check_alerts().await;
        let refired = meta.list_all_enabled_alerts().unwrap()[0]
            .last_triggered_at
            .unwrap();
        assert!(refired > t1, "cooldown elapsed, alert should refire");
    }

    #[tokio::test]
    async fn event_count_metric_filters_by_name() {
        let (_dir, events, meta) = setup();
        let now = Utc::now();
        let mut named = error_event(now);
        named.event_type = "custom".into();
        events.insert_events(&[named]).unwrap();
        events
            .backfill_event_name("p1", &"f".repeat(16), "Checkout Completed")
            .unwrap();

        let mut a = alert(0, 60);
        a.metric = "event_count".into();
        a.event_name = Some("Checkout Completed".into());
        meta.create_alert(&a).unwrap();

        let scheduler = AlertScheduler::new(events.clone(), meta.clone());
        scheduler.check_alerts().await;
        assert!(meta.list_all_enabled_alerts().unwrap()[0]
            .last_triggered_at
            .is_some());
    }
}
