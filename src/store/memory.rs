use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{effective_limit, strip_reserved, Document, DocumentStore, Filter, StoreError};
use crate::clock::Clock;

/// Process-local store. Each collection keeps insertion order.
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    clock: Arc<dyn Clock>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            clock,
            available: AtomicBool::new(true),
        }
    }

    /// Make every operation fail with `Unavailable` until switched back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store switched off".into()))
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(
        &self,
        collection: &str,
        fields: Map<String, Value>,
    ) -> Result<Document, StoreError> {
        self.ensure_available()?;
        let now = self.clock.now();
        let doc = Document {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            fields: strip_reserved(fields),
        };
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(doc.clone());
        debug!(collection, id = %doc.id, "document created");
        Ok(doc)
    }

    async fn list(
        &self,
        collection: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError> {
        self.ensure_available()?;
        let guard = self.collections.read().await;
        let Some(docs) = guard.get(collection) else {
            return Ok(Vec::new());
        };
        let matching = docs.iter().filter(|d| filter.matches(d)).cloned();
        Ok(match effective_limit(limit) {
            Some(n) => matching.take(n).collect(),
            None => matching.collect(),
        })
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        fields: Map<String, Value>,
    ) -> Result<Option<Document>, StoreError> {
        self.ensure_available()?;
        let mut guard = self.collections.write().await;
        let Some(doc) = guard
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| filter.matches(d)))
        else {
            return Ok(None);
        };
        doc.fields.extend(strip_reserved(fields));
        doc.updated_at = self.clock.now().max(doc.updated_at);
        debug!(collection, id = %doc.id, "document updated");
        Ok(Some(doc.clone()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.ensure_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;
    use time::Duration;

    fn fields(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn store() -> (Arc<ManualClock>, MemoryStore) {
        let clock = Arc::new(ManualClock::default());
        let store = MemoryStore::new(clock.clone());
        (clock, store)
    }

    #[tokio::test]
    async fn create_find_update_round_trip() {
        let (clock, store) = store();
        let created = store.create("x", fields(json!({"a": 1}))).await.unwrap();

        let found = store
            .find_one("x", &Filter::by_id(created.id.clone()))
            .await
            .unwrap()
            .expect("document exists");
        assert_eq!(found.get("a"), Some(&json!(1)));
        assert_eq!(found.created_at, found.updated_at);

        clock.advance(Duration::seconds(1));
        let updated = store
            .update("x", &Filter::by_id(created.id.clone()), fields(json!({"a": 2})))
            .await
            .unwrap()
            .expect("document exists");
        assert_eq!(updated.get("a"), Some(&json!(2)));
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at > updated.created_at);
    }

    #[tokio::test]
    async fn list_respects_limit_and_order() {
        let (_, store) = store();
        for i in 0..5 {
            store.create("x", fields(json!({"i": i}))).await.unwrap();
        }
        let two = store.list("x", &Filter::new(), Some(2)).await.unwrap();
        assert_eq!(two.len(), 2);
        assert_eq!(two[0].get("i"), Some(&json!(0)));
        assert_eq!(two[1].get("i"), Some(&json!(1)));

        let all = store.list("x", &Filter::new(), None).await.unwrap();
        assert_eq!(all.len(), 5);
        let uncapped = store.list("x", &Filter::new(), Some(0)).await.unwrap();
        assert_eq!(uncapped.len(), 5);
    }

    #[tokio::test]
    async fn list_unknown_collection_is_empty() {
        let (_, store) = store();
        let docs = store
            .list("nothing", &Filter::new().eq("a", 1), None)
            .await
            .unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn update_without_match_returns_none() {
        let (_, store) = store();
        store.create("x", fields(json!({"a": 1}))).await.unwrap();
        let res = store
            .update("x", &Filter::new().eq("a", 9), fields(json!({"a": 2})))
            .await
            .unwrap();
        assert!(res.is_none());
    }

    #[tokio::test]
    async fn caller_cannot_forge_store_fields() {
        let (_, store) = store();
        let created = store
            .create("x", fields(json!({"id": "mine", "created_at": "never", "a": 1})))
            .await
            .unwrap();
        assert_ne!(created.id, "mine");
        assert!(!created.fields.contains_key("created_at"));

        let updated = store
            .update("x", &Filter::by_id(created.id.clone()), fields(json!({"id": "other"})))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.id, created.id);
    }

    #[tokio::test]
    async fn collections_are_isolated() {
        let (_, store) = store();
        store.create("a", fields(json!({"k": 1}))).await.unwrap();
        assert!(store
            .find_one("b", &Filter::new().eq("k", 1))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn switched_off_store_is_unavailable() {
        let (_, store) = store();
        store.set_available(false);
        let err = store.create("x", Map::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(store.ping().await.is_err());
        store.set_available(true);
        assert!(store.ping().await.is_ok());
    }
}
