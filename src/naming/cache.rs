//! Read-through name cache
//!
//! Thin wrapper over the metadata store's event_names table. The naming
//! engine consults it before enqueuing and again before calling the
//! provider; the query plane uses the same table (via batch lookups) to
//! enrich event listings.

use std::sync::Arc;

use crate::storage::MetaStore;

use super::provider::NamingResult;

pub struct NameCache {
    meta: Arc<MetaStore>,
}

impl NameCache {
    pub fn new(meta: Arc<MetaStore>) -> Self {
        Self { meta }
    }

    /// Display name for a fingerprint, if cached. User overrides win over
    /// AI names. Lookup failures read as a miss — the worst case is a
    /// redundant naming call resolved by the idempotent upsert.
    pub fn get(&self, project_id: &str, fingerprint: &str) -> Option<String> {
        match self.meta.get_event_name(project_id, fingerprint) {
            Ok(Some(en)) => Some(en.display_name().to_string()),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("name cache lookup for {fingerprint}: {e:#}");
                None
            }
        }
    }

    /// Store an AI-generated name.
    pub fn set(&self, project_id: &str, fingerprint: &str, result: &NamingResult) -> anyhow::Result<()> {
        let source_file = if result.source_file.is_empty() {
            None
        } else {
            Some(result.source_file.as_str())
        };
        self.meta
            .set_event_name(project_id, fingerprint, &result.name, source_file, Some(result.confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Encryptor;
    use tempfile::tempdir;

    #[test]
    fn user_override_wins() {
        let dir = tempdir().unwrap();
        let meta = Arc::new(MetaStore::open(&dir.path().join("meta.db"), Encryptor::disabled()).unwrap());
        meta.create_project("p1", "Test").unwrap();
        let cache = NameCache::new(meta.clone());

        assert_eq!(cache.get("p1", "fp1"), None);

        cache
            .set(
                "p1",
                "fp1",
                &NamingResult {
                    name: "AI name".into(),
                    confidence: 0.8,
                    source_file: String::new(),
                },
            )
            .unwrap();
        assert_eq!(cache.get("p1", "fp1").as_deref(), Some("AI name"));

        meta.override_event_name("p1", "fp1", "Human name").unwrap();
        assert_eq!(cache.get("p1", "fp1").as_deref(), Some("Human name"));
    }
}
