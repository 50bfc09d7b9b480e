//! Append-only activity trail.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::db::{to_fields, Collection, DocumentStore};
use crate::errors::AppError;
use crate::models::{timestamp_now, ActivityAction, ActivityLog};

/// Appends audit entries to the `activityLogs` collection.
#[derive(Clone)]
pub struct ActivityRecorder {
    docs: Arc<dyn DocumentStore>,
}

impl ActivityRecorder {
    pub fn new(docs: Arc<dyn DocumentStore>) -> Self {
        Self { docs }
    }

    /// Append one entry stamped with the current time.
    pub async fn record(
        &self,
        action: ActivityAction,
        user_id: &str,
        details: Map<String, Value>,
    ) -> Result<ActivityLog, AppError> {
        let mut entry = ActivityLog {
            id: String::new(),
            action,
            user_id: user_id.to_string(),
            details,
            timestamp: timestamp_now(),
        };
        entry.id = self
            .docs
            .insert(Collection::ActivityLogs, to_fields(&entry)?)
            .await?;
        Ok(entry)
    }

    /// Like [`ActivityRecorder::record`], but a failure is logged and swallowed.
    ///
    /// The mutation being audited has already committed and stays committed.
    pub async fn record_best_effort(
        &self,
        action: ActivityAction,
        user_id: &str,
        details: Value,
    ) -> Option<ActivityLog> {
        let details = match details {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };

        match self.record(action, user_id, details).await {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(
                    action = action.as_str(),
                    %user_id,
                    "Failed to append activity log entry: {}",
                    e
                );
                None
            }
        }
    }
}

/// Sort entries newest first.
///
/// Expects storage (append) order. Entries sharing a millisecond keep reverse append order.
pub fn newest_first(logs: &mut [ActivityLog]) {
    logs.reverse();
    logs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        Document, Filter, LocalDocumentStore, MemoryStorage, Subscription, WriteBatch,
    };
    use async_trait::async_trait;
    use serde_json::json;

    /// A store whose writes always fail.
    struct BrokenStore {
        inner: LocalDocumentStore,
    }

    #[async_trait]
    impl DocumentStore for BrokenStore {
        async fn query(
            &self,
            collection: Collection,
            filter: &Filter,
        ) -> Result<Vec<Document>, AppError> {
            self.inner.query(collection, filter).await
        }

        async fn commit(&self, _batch: WriteBatch) -> Result<Vec<String>, AppError> {
            Err(AppError::Database("disk on fire".to_string()))
        }

        fn watch(&self, collection: Collection) -> Subscription {
            self.inner.watch(collection)
        }

        fn kind(&self) -> &'static str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_record_appends_entry() {
        let docs: Arc<dyn DocumentStore> =
            Arc::new(LocalDocumentStore::open(Arc::new(MemoryStorage::new())).unwrap());
        let recorder = ActivityRecorder::new(docs.clone());

        let entry = recorder
            .record_best_effort(
                ActivityAction::CertificateIssued,
                "u1",
                json!({"eventName": "Hackathon"}),
            )
            .await
            .unwrap();
        assert!(!entry.id.is_empty());

        let stored = docs.query(Collection::ActivityLogs, &Filter::All).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].get("action"), Some(&json!("certificate_issued")));
        assert_eq!(stored[0].get("details"), Some(&json!({"eventName": "Hackathon"})));
    }

    #[tokio::test]
    async fn test_best_effort_swallows_failures() {
        let docs: Arc<dyn DocumentStore> = Arc::new(BrokenStore {
            inner: LocalDocumentStore::open(Arc::new(MemoryStorage::new())).unwrap(),
        });
        let recorder = ActivityRecorder::new(docs);

        assert!(recorder
            .record(ActivityAction::EventAdded, "u1", Map::new())
            .await
            .is_err());
        assert!(recorder
            .record_best_effort(ActivityAction::EventAdded, "u1", Value::Null)
            .await
            .is_none());
    }

    #[test]
    fn test_newest_first() {
        let entry = |ts: &str| ActivityLog {
            id: ts.to_string(),
            action: ActivityAction::EventAdded,
            user_id: "u".to_string(),
            details: Map::new(),
            timestamp: ts.to_string(),
        };
        let mut logs = vec![
            entry("2024-06-01T10:00:00.000Z"),
            entry("2024-06-03T10:00:00.000Z"),
            entry("2024-06-02T10:00:00.000Z"),
        ];
        newest_first(&mut logs);
        let order: Vec<_> = logs.iter().map(|l| &l.timestamp[..10]).collect();
        assert_eq!(order, vec!["2024-06-03", "2024-06-02", "2024-06-01"]);
    }

    #[test]
    fn test_same_millisecond_keeps_append_order_reversed() {
        let entry = |id: &str| ActivityLog {
            id: id.to_string(),
            action: ActivityAction::EventAdded,
            user_id: "u".to_string(),
            details: Map::new(),
            timestamp: "2024-06-01T10:00:00.000Z".to_string(),
        };
        let mut logs = vec![entry("first"), entry("second"), entry("third")];
        newest_first(&mut logs);
        let ids: Vec<_> = logs.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["third", "second", "first"]);
    }
}
