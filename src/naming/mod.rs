//! Asynchronous event naming engine
//!
//! Ingestion submits one job per non-pageview event; a small worker pool
//! resolves each unique fingerprint to a human-readable name through the
//! configured LLM provider and persists it (cache upsert + columnar
//! backfill). Jobs are best-effort: a full queue or a failed provider call
//! just drops the job, because the next ingest of the same fingerprint
//! resubmits it.
//!
//! The provider and the optional source matcher are hot-swappable behind a
//! read/write lock — reads happen on every job, writes only when settings
//! change.

pub mod cache;
pub mod chat;
pub mod provider;

mod anthropic;
mod ollama;
mod openai;

pub use cache::NameCache;
pub use provider::{provider_from_config, NamingRequest, NamingResult, Provider};

use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::storage::EventStore;

const JOB_QUEUE_CAPACITY: usize = 1000;
const DEFAULT_WORKERS: usize = 2;

/// Finds source code for DOM elements (used when a source connection is
/// configured).
#[async_trait]
pub trait SourceMatcher: Send + Sync {
    /// Returns `(source_code, source_file)` for the best-matching indexed
    /// file, or `None` when nothing scores high enough or fetching fails.
    async fn match_and_fetch(
        &self,
        project_id: &str,
        element_id: &str,
        element_classes: &str,
        parent_path: &str,
    ) -> Option<(String, String)>;
}

/// A pending naming task.
#[derive(Debug, Clone)]
pub struct NamingJob {
    pub project_id: String,
    pub fingerprint: String,
    pub request: NamingRequest,
}

struct NamerInner {
    provider: RwLock<Option<Arc<dyn Provider>>>,
    matcher: RwLock<Option<Arc<dyn SourceMatcher>>>,
    cache: NameCache,
    events: Arc<EventStore>,
}

/// Naming orchestrator: bounded job queue plus a fixed worker pool.
pub struct Namer {
    inner: Arc<NamerInner>,
    jobs_tx: Mutex<Option<mpsc::Sender<NamingJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Namer {
    pub fn new(
        provider: Option<Arc<dyn Provider>>,
        cache: NameCache,
        events: Arc<EventStore>,
        workers: usize,
    ) -> Self {
        let workers = if workers == 0 { DEFAULT_WORKERS } else { workers };
        let (tx, rx) = mpsc::channel::<NamingJob>(JOB_QUEUE_CAPACITY);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let inner = Arc::new(NamerInner {
            provider: RwLock::new(provider),
            matcher: RwLock::new(None),
            cache,
            events,
        });

        let handles = (0..workers)
            .map(|_| {
                let inner = inner.clone();
                let rx = rx.clone();
                tokio::spawn(async move {
                    loop {
                        // Workers share one receiver; the lock is held only
                        // for the dequeue, not while processing.
                        let job = rx.lock().await.recv().await;
                        let Some(job) = job else { break };
                        inner.process(job).await;
                    }
                })
            })
            .collect();

        Self {
            inner,
            jobs_tx: Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
        }
    }

    /// Swap the LLM provider at runtime (settings change). `None` disables
    /// naming.
    pub fn set_provider(&self, provider: Option<Arc<dyn Provider>>) {
        *self.inner.provider.write().unwrap() = provider;
    }

    /// Set the source code matcher (called when a source host is connected).
    pub fn set_matcher(&self, matcher: Option<Arc<dyn SourceMatcher>>) {
        *self.inner.matcher.write().unwrap() = matcher;
    }

    pub fn has_provider(&self) -> bool {
        self.inner.provider.read().unwrap().is_some()
    }

    /// Queue a naming job unless the fingerprint is already cached. Silently
    /// drops when no provider is configured or the queue is full.
    pub fn submit(&self, job: NamingJob) {
        if !self.has_provider() {
            return;
        }
        if self.inner.cache.get(&job.project_id, &job.fingerprint).is_some() {
            return;
        }

        let tx = self.jobs_tx.lock().unwrap().clone();
        if let Some(tx) = tx {
            if tx.try_send(job).is_err() {
                // Queue full (or shutting down) — the next ingest of this
                // fingerprint will retry.
                tracing::debug!("naming queue full, dropping job");
            }
        }
    }

    /// Queue naming jobs for every unnamed fingerprint already in the event
    /// store. Best-effort: stops as soon as the queue fills up.
    pub fn backfill(&self, project_id: &str) {
        if !self.has_provider() {
            return;
        }

        let unnamed = match self.inner.events.unnamed_fingerprints(project_id) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!("backfill query: {e:#}");
                return;
            }
        };
        let total = unnamed.len();

        let tx = self.jobs_tx.lock().unwrap().clone();
        let Some(tx) = tx else { return };

        let mut queued = 0usize;
        for row in unnamed {
            if self.inner.cache.get(project_id, &row.fingerprint).is_some() {
                continue;
            }
            let job = NamingJob {
                project_id: project_id.to_string(),
                fingerprint: row.fingerprint.clone(),
                request: NamingRequest {
                    element_tag: row.element_tag,
                    element_id: row.element_id,
                    element_classes: row.element_classes,
                    element_text: row.element_text,
                    aria_label: row.aria_label,
                    parent_path: row.parent_path,
                    url: row.url,
                    url_path: row.url_path,
                    page_title: row.page_title,
                    ..Default::default()
                },
            };
            if tx.try_send(job).is_err() {
                tracing::warn!("backfill queue full, queued {queued}/{total}");
                return;
            }
            queued += 1;
        }
        if queued > 0 {
            tracing::info!("backfill: queued {queued} unnamed fingerprints for naming");
        }
    }

    /// Close the job channel and wait for the workers to drain.
    pub async fn shutdown(&self) {
        self.jobs_tx.lock().unwrap().take();
        let handles: Vec<_> = self.workers.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}

impl NamerInner {
    async fn process(&self, job: NamingJob) {
        // The name may have been resolved while the job sat in the queue.
        if self.cache.get(&job.project_id, &job.fingerprint).is_some() {
            return;
        }

        let (provider, matcher) = {
            let provider = self.provider.read().unwrap().clone();
            let matcher = self.matcher.read().unwrap().clone();
            (provider, matcher)
        };
        let Some(provider) = provider else { return };

        // Enrich with source code when a matcher is wired in.
        let mut request = job.request;
        if let Some(matcher) = matcher {
            if let Some((code, file)) = matcher
                .match_and_fetch(
                    &job.project_id,
                    &request.element_id,
                    &request.element_classes,
                    &request.parent_path,
                )
                .await
            {
                request.source_code = code;
                request.source_file = file;
            }
        }

        let result = match provider.generate_event_name(&request).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("naming event {}: {e:#}", job.fingerprint);
                return;
            }
        };

        if let Err(e) = self.cache.set(&job.project_id, &job.fingerprint, &result) {
            tracing::warn!("caching name for {}: {e:#}", job.fingerprint);
            return;
        }

        if let Err(e) = self
            .events
            .backfill_event_name(&job.project_id, &job.fingerprint, &result.name)
        {
            tracing::warn!("backfilling name for {}: {e:#}", job.fingerprint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Encryptor, EventStore, MetaStore, NewEvent};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FixedProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Provider for FixedProvider {
        async fn generate_event_name(&self, req: &NamingRequest) -> anyhow::Result<NamingResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(NamingResult {
                name: format!("User clicked '{}'", req.element_id),
                confidence: 0.9,
                source_file: req.source_file.clone(),
            })
        }
    }

    fn stores() -> (tempfile::TempDir, Arc<MetaStore>, Arc<EventStore>) {
        let dir = tempfile::tempdir().unwrap();
        let meta = Arc::new(MetaStore::open(&dir.path().join("meta.db"), Encryptor::disabled()).unwrap());
        meta.create_project("p1", "Test").unwrap();
        let events = Arc::new(EventStore::open_in_memory().unwrap());
        (dir, meta, events)
    }

    fn job(fingerprint: &str) -> NamingJob {
        NamingJob {
            project_id: "p1".to_string(),
            fingerprint: fingerprint.to_string(),
            request: NamingRequest {
                element_tag: "button".into(),
                element_id: "buy-btn".into(),
                ..Default::default()
            },
        }
    }

    async fn wait_for_name(cache: &NameCache, fingerprint: &str) -> Option<String> {
        for _ in 0..100 {
            if let Some(name) = cache.get("p1", fingerprint) {
                return Some(name);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }

    #[tokio::test]
    async fn job_resolves_name_and_backfills() {
        let (_dir, meta, events) = stores();

        events
            .insert_events(&[NewEvent {
                project_id: "p1".into(),
                session_id: "s1".into(),
                event_type: "click".into(),
                fingerprint: "fp1fp1fp1fp1fp1f".into(),
                url: "https://e.com/".into(),
                url_path: "/".into(),
                timestamp: chrono::Utc::now(),
                ..Default::default()
            }])
            .unwrap();

        let provider = Arc::new(FixedProvider { calls: AtomicUsize::new(0) });
        let namer = Namer::new(
            Some(provider.clone()),
            NameCache::new(meta.clone()),
            events.clone(),
            2,
        );

        namer.submit(job("fp1fp1fp1fp1fp1f"));

        let cache = NameCache::new(meta.clone());
        let name = wait_for_name(&cache, "fp1fp1fp1fp1fp1f").await;
        assert_eq!(name.as_deref(), Some("User clicked 'buy-btn'"));

        // Backfill reached the event store too.
        let stored = events
            .event_name_for_fingerprint("p1", "fp1fp1fp1fp1fp1f")
            .unwrap();
        assert_eq!(stored.as_deref(), Some("User clicked 'buy-btn'"));

        namer.shutdown().await;
    }

    #[tokio::test]
    async fn cache_hit_skips_provider_call() {
        let (_dir, meta, events) = stores();
        meta.set_event_name("p1", "fp2fp2fp2fp2fp2f", "Already named", None, None)
            .unwrap();

        let provider = Arc::new(FixedProvider { calls: AtomicUsize::new(0) });
        let namer = Namer::new(
            Some(provider.clone()),
            NameCache::new(meta.clone()),
            events,
            1,
        );

        namer.submit(job("fp2fp2fp2fp2fp2f"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        namer.shutdown().await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_provider_drops_jobs() {
        let (_dir, meta, events) = stores();
        let namer = Namer::new(None, NameCache::new(meta.clone()), events, 1);
        namer.submit(job("fp3fp3fp3fp3fp3f"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(NameCache::new(meta).get("p1", "fp3fp3fp3fp3fp3f"), None);
        namer.shutdown().await;
    }

    #[tokio::test]
    async fn backfill_names_existing_events() {
        let (_dir, meta, events) = stores();
        events
            .insert_events(&[NewEvent {
                project_id: "p1".into(),
                session_id: "s1".into(),
                event_type: "click".into(),
                fingerprint: "fp4fp4fp4fp4fp4f".into(),
                element_id: Some("save-btn".into()),
                url: "https://e.com/".into(),
                url_path: "/".into(),
                timestamp: chrono::Utc::now(),
                ..Default::default()
            }])
            .unwrap();

        let provider = Arc::new(FixedProvider { calls: AtomicUsize::new(0) });
        let namer = Namer::new(
            Some(provider),
            NameCache::new(meta.clone()),
            events.clone(),
            1,
        );

        namer.backfill("p1");

        let cache = NameCache::new(meta);
        let name = wait_for_name(&cache, "fp4fp4fp4fp4fp4f").await;
        assert_eq!(name.as_deref(), Some("User clicked 'save-btn'"));
        namer.shutdown().await;
    }

    #[tokio::test]
    async fn hot_swap_provider() {
        let (_dir, meta, events) = stores();
        let namer = Namer::new(None, NameCache::new(meta.clone()), events, 1);
        assert!(!namer.has_provider());

        namer.set_provider(Some(Arc::new(FixedProvider { calls: AtomicUsize::new(0) })));
        assert!(namer.has_provider());

        namer.set_provider(None);
        assert!(!namer.has_provider());
        namer.shutdown().await;
    }
}
