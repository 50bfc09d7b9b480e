//! Local-only variant: collections JSON-encoded in key-value storage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use super::{
    apply_batch, Collection, Document, DocumentStore, Filter, KeyValueStorage, Subscription,
    Watchers, WriteBatch,
};
use crate::errors::AppError;

/// Prefix shared by every key this application writes to local storage.
pub const STORAGE_PREFIX: &str = "codvix_";

/// Storage key holding one collection.
pub fn storage_key(collection: Collection) -> String {
    format!("{}{}", STORAGE_PREFIX, collection.name())
}

/// Millisecond-timestamp ids, bumped past the previous id when two land in the same millisecond.
#[derive(Debug, Default)]
pub struct TimestampIds {
    last: AtomicI64,
}

impl TimestampIds {
    pub fn next(&self) -> String {
        let now = Utc::now().timestamp_millis();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(prev + 1);
            match self
                .last
                .compare_exchange(prev, candidate, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => return candidate.to_string(),
                Err(actual) => prev = actual,
            }
        }
    }
}

/// Document store over [`KeyValueStorage`].
pub struct LocalDocumentStore {
    storage: Arc<dyn KeyValueStorage>,
    collections: Mutex<HashMap<Collection, Vec<Document>>>,
    watchers: Watchers,
    ids: TimestampIds,
}

impl LocalDocumentStore {
    /// Load every collection from storage.
    pub fn open(storage: Arc<dyn KeyValueStorage>) -> Result<Self, AppError> {
        let mut collections = HashMap::new();
        for collection in Collection::ALL {
            collections.insert(collection, load_collection(storage.as_ref(), collection)?);
        }

        let watchers = Watchers::new(|c| collections.get(&c).cloned().unwrap_or_default());

        Ok(Self {
            storage,
            collections: Mutex::new(collections),
            watchers,
            ids: TimestampIds::default(),
        })
    }
}

fn load_collection(
    storage: &dyn KeyValueStorage,
    collection: Collection,
) -> Result<Vec<Document>, AppError> {
    let Some(raw) = storage.get(&storage_key(collection))? else {
        return Ok(Vec::new());
    };

    let items: Vec<Value> = serde_json::from_str(&raw).map_err(|e| {
        AppError::Storage(format!(
            "Stored {} is not a JSON array: {}",
            collection.name(),
            e
        ))
    })?;

    Ok(items
        .into_iter()
        .filter_map(|item| {
            let doc = Document::from_value(item);
            if doc.is_none() {
                tracing::warn!(collection = collection.name(), "Dropping stored record without id");
            }
            doc
        })
        .collect())
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    async fn query(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Vec<Document>, AppError> {
        Ok(self
            .watchers
            .current(collection)
            .iter()
            .filter(|doc| filter.matches(doc))
            .cloned()
            .collect())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<Vec<String>, AppError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mut collections = self
            .collections
            .lock()
            .map_err(|_| AppError::Internal("Collection lock poisoned".to_string()))?;

        let mut working: HashMap<Collection, Vec<Document>> = batch
            .touched()
            .into_iter()
            .map(|c| (c, collections.get(&c).cloned().unwrap_or_default()))
            .collect();

        let ids = apply_batch(&mut working, &batch, || self.ids.next())?;

        let mut entries = Vec::with_capacity(working.len());
        for (collection, docs) in &working {
            let values: Vec<Value> = docs.iter().map(Document::to_value).collect();
            entries.push((storage_key(*collection), serde_json::to_string(&values)?));
        }
        self.storage.set_many(&entries)?;

        for (collection, docs) in working {
            self.watchers.publish(collection, docs.clone());
            collections.insert(collection, docs);
        }

        tracing::debug!(inserted = ids.len(), "Committed local batch");
        Ok(ids)
    }

    fn watch(&self, collection: Collection) -> Subscription {
        self.watchers.subscribe(collection)
    }

    fn kind(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{FileStorage, MemoryStorage};
    use serde_json::{json, Map};
    use tempfile::TempDir;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_timestamp_ids_are_unique_and_increasing() {
        let ids = TimestampIds::default();
        let a: i64 = ids.next().parse().unwrap();
        let b: i64 = ids.next().parse().unwrap();
        let c: i64 = ids.next().parse().unwrap();
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn test_insert_is_stored_as_json_array() {
        let storage = Arc::new(MemoryStorage::new());
        let store = LocalDocumentStore::open(storage.clone()).unwrap();

        let id = store
            .insert(Collection::Announcements, fields(json!({"message": "hi"})))
            .await
            .unwrap();

        let raw = storage.get("codvix_announcements").unwrap().unwrap();
        let parsed: Vec<Value> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0]["id"], id.as_str());
        assert_eq!(parsed[0]["message"], "hi");
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_nothing_behind() {
        let storage = Arc::new(MemoryStorage::new());
        let store = LocalDocumentStore::open(storage.clone()).unwrap();

        let batch = WriteBatch::new()
            .insert(Collection::Registrations, fields(json!({"userId": "u1"})))
            .increment_bounded(Collection::Events, "missing", "registeredCount", "maxParticipants");
        assert!(matches!(store.commit(batch).await, Err(AppError::NotFound(_))));

        let regs = store.query(Collection::Registrations, &Filter::All).await.unwrap();
        assert!(regs.is_empty());
        assert!(storage.get("codvix_registrations").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_watch_sees_commits() {
        let store = LocalDocumentStore::open(Arc::new(MemoryStorage::new())).unwrap();
        let mut sub = store.watch(Collection::Coordinators);
        assert!(sub.current().is_empty());

        store
            .insert(Collection::Coordinators, fields(json!({"name": "Rahul"})))
            .await
            .unwrap();

        let snapshot = sub.changed().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].get("name"), Some(&json!("Rahul")));
    }

    #[tokio::test]
    async fn test_reopen_restores_collections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("local.json");

        {
            let storage = Arc::new(FileStorage::open(&path).unwrap());
            let store = LocalDocumentStore::open(storage).unwrap();
            store
                .insert(Collection::Events, fields(json!({"title": "Quiz"})))
                .await
                .unwrap();
        }

        let storage = Arc::new(FileStorage::open(&path).unwrap());
        let store = LocalDocumentStore::open(storage).unwrap();
        let events = store.query(Collection::Events, &Filter::All).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].get("title"), Some(&json!("Quiz")));
    }

    #[tokio::test]
    async fn test_query_filter() {
        let store = LocalDocumentStore::open(Arc::new(MemoryStorage::new())).unwrap();
        for (user, event) in [("u1", "e1"), ("u2", "e1"), ("u1", "e2")] {
            store
                .insert(
                    Collection::Registrations,
                    fields(json!({"userId": user, "eventId": event})),
                )
                .await
                .unwrap();
        }

        let e1 = store
            .query(
                Collection::Registrations,
                &Filter::field_equals("eventId", "e1"),
            )
            .await
            .unwrap();
        assert_eq!(e1.len(), 2);
    }
}
