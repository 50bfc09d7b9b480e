//! Document store abstraction.
//!
//! The entity store talks to persistence only through [`DocumentStore`]. Two variants exist:
//! a SQLite database that pushes canonical snapshots back to watchers (the remote variant) and a
//! key-value "local storage" holding JSON-encoded collections (the local-only variant).

mod kv;
mod local;
mod sqlite;

pub use kv::*;
pub use local::*;
pub use sqlite::*;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tokio::sync::watch;

use crate::errors::AppError;

/// Named collections in the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Events,
    Registrations,
    Announcements,
    Coordinators,
    Certificates,
    ActivityLogs,
    Users,
}

impl Collection {
    /// Every collection, in a fixed order.
    pub const ALL: [Collection; 7] = [
        Collection::Events,
        Collection::Registrations,
        Collection::Announcements,
        Collection::Coordinators,
        Collection::Certificates,
        Collection::ActivityLogs,
        Collection::Users,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Events => "events",
            Collection::Registrations => "registrations",
            Collection::Announcements => "announcements",
            Collection::Coordinators => "coordinators",
            Collection::Certificates => "certificates",
            Collection::ActivityLogs => "activityLogs",
            Collection::Users => "users",
        }
    }
}

/// A schema-less record: an id plus a JSON object body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Field lookup.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// Decode into a typed entity, with the document id injected as `id`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        let mut data = self.data.clone();
        data.insert("id".to_string(), Value::String(self.id.clone()));
        Ok(serde_json::from_value(Value::Object(data))?)
    }

    /// Render as a JSON object including `id`, the shape local storage keeps.
    pub(crate) fn to_value(&self) -> Value {
        let mut data = self.data.clone();
        data.insert("id".to_string(), Value::String(self.id.clone()));
        Value::Object(data)
    }

    /// Inverse of [`Document::to_value`]. Objects without a string `id` are rejected.
    pub(crate) fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut data) = value else {
            return None;
        };
        let id = match data.remove("id") {
            Some(Value::String(id)) => id,
            Some(Value::Number(n)) => n.to_string(),
            _ => return None,
        };
        Some(Self { id, data })
    }
}

/// Serialize an entity into a document body, dropping its `id` field.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Map<String, Value>, AppError> {
    match serde_json::to_value(value)? {
        Value::Object(mut map) => {
            map.remove("id");
            Ok(map)
        }
        other => Err(AppError::Internal(format!(
            "Expected a JSON object, got {}",
            other
        ))),
    }
}

/// Decode a snapshot into typed entities, skipping malformed records.
pub fn decode_all<T: DeserializeOwned>(collection: Collection, docs: &[Document]) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| match doc.decode::<T>() {
            Ok(entity) => Some(entity),
            Err(e) => {
                tracing::warn!(
                    collection = collection.name(),
                    id = %doc.id,
                    "Skipping malformed document: {}",
                    e
                );
                None
            }
        })
        .collect()
}

/// One-shot query filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    FieldEquals(String, Value),
}

impl Filter {
    pub fn field_equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::FieldEquals(field.into(), value.into())
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::FieldEquals(field, value) => doc.get(field) == Some(value),
        }
    }
}

/// A single write inside a [`WriteBatch`].
#[derive(Debug, Clone)]
pub enum WriteOp {
    Insert {
        collection: Collection,
        data: Map<String, Value>,
    },
    /// Insert unless a document already has the same values for every `unique_on` field.
    InsertUnique {
        collection: Collection,
        data: Map<String, Value>,
        unique_on: Vec<String>,
    },
    /// Shallow merge of `patch` into an existing document.
    Update {
        collection: Collection,
        id: String,
        patch: Map<String, Value>,
    },
    /// Add one to `field` unless it already equals or exceeds `limit_field`.
    IncrementBounded {
        collection: Collection,
        id: String,
        field: String,
        limit_field: String,
    },
    /// Fail unless `field` is at most `at_most`. Writes nothing.
    Guard {
        collection: Collection,
        id: String,
        field: String,
        at_most: u64,
    },
    Delete {
        collection: Collection,
        id: String,
    },
    DeleteWhere {
        collection: Collection,
        filter: Filter,
    },
}

impl WriteOp {
    pub fn collection(&self) -> Collection {
        match self {
            WriteOp::Insert { collection, .. }
            | WriteOp::InsertUnique { collection, .. }
            | WriteOp::Update { collection, .. }
            | WriteOp::IncrementBounded { collection, .. }
            | WriteOp::Guard { collection, .. }
            | WriteOp::Delete { collection, .. }
            | WriteOp::DeleteWhere { collection, .. } => *collection,
        }
    }
}

/// An all-or-nothing group of writes.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, collection: Collection, data: Map<String, Value>) -> Self {
        self.ops.push(WriteOp::Insert { collection, data });
        self
    }

    pub fn insert_unique(
        mut self,
        collection: Collection,
        data: Map<String, Value>,
        unique_on: &[&str],
    ) -> Self {
        self.ops.push(WriteOp::InsertUnique {
            collection,
            data,
            unique_on: unique_on.iter().map(|f| f.to_string()).collect(),
        });
        self
    }

    pub fn update(mut self, collection: Collection, id: &str, patch: Map<String, Value>) -> Self {
        self.ops.push(WriteOp::Update {
            collection,
            id: id.to_string(),
            patch,
        });
        self
    }

    pub fn increment_bounded(
        mut self,
        collection: Collection,
        id: &str,
        field: &str,
        limit_field: &str,
    ) -> Self {
        self.ops.push(WriteOp::IncrementBounded {
            collection,
            id: id.to_string(),
            field: field.to_string(),
            limit_field: limit_field.to_string(),
        });
        self
    }

    pub fn guard(mut self, collection: Collection, id: &str, field: &str, at_most: u64) -> Self {
        self.ops.push(WriteOp::Guard {
            collection,
            id: id.to_string(),
            field: field.to_string(),
            at_most,
        });
        self
    }

    pub fn delete(mut self, collection: Collection, id: &str) -> Self {
        self.ops.push(WriteOp::Delete {
            collection,
            id: id.to_string(),
        });
        self
    }

    pub fn delete_where(mut self, collection: Collection, filter: Filter) -> Self {
        self.ops.push(WriteOp::DeleteWhere { collection, filter });
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Distinct collections this batch writes to.
    pub fn touched(&self) -> Vec<Collection> {
        let mut touched: Vec<Collection> = self.ops.iter().map(WriteOp::collection).collect();
        touched.sort();
        touched.dedup();
        touched
    }
}

/// Full contents of one collection at a point in time.
pub type Snapshot = Arc<Vec<Document>>;

/// A live subscription to one collection.
///
/// Each push replaces the whole snapshot. Dropping the subscription unsubscribes.
pub struct Subscription {
    collection: Collection,
    rx: watch::Receiver<Snapshot>,
}

impl Subscription {
    pub fn new(collection: Collection, rx: watch::Receiver<Snapshot>) -> Self {
        Self { collection, rx }
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    /// Latest snapshot, without waiting.
    pub fn current(&self) -> Snapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next push. Returns `None` once the store has shut down.
    pub async fn changed(&mut self) -> Option<Snapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

/// Per-collection snapshot publishers, indexed by collection.
pub(crate) struct Watchers {
    senders: Vec<watch::Sender<Snapshot>>,
}

impl Watchers {
    pub(crate) fn new(mut initial: impl FnMut(Collection) -> Vec<Document>) -> Self {
        let senders = Collection::ALL
            .into_iter()
            .map(|c| watch::Sender::new(Arc::new(initial(c))))
            .collect();
        Self { senders }
    }

    pub(crate) fn publish(&self, collection: Collection, docs: Vec<Document>) {
        self.senders[collection as usize].send_replace(Arc::new(docs));
    }

    pub(crate) fn current(&self, collection: Collection) -> Snapshot {
        self.senders[collection as usize].borrow().clone()
    }

    pub(crate) fn subscribe(&self, collection: Collection) -> Subscription {
        Subscription::new(collection, self.senders[collection as usize].subscribe())
    }
}

/// Persistence seam shared by the remote and local-only variants.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// One-shot read of the current contents of a collection.
    async fn query(&self, collection: Collection, filter: &Filter)
        -> Result<Vec<Document>, AppError>;

    /// Apply a batch atomically. Returns the ids of inserted documents, in batch order.
    async fn commit(&self, batch: WriteBatch) -> Result<Vec<String>, AppError>;

    /// Subscribe to full-collection snapshots.
    fn watch(&self, collection: Collection) -> Subscription;

    /// Which variant this is, for logs.
    fn kind(&self) -> &'static str;

    async fn insert(
        &self,
        collection: Collection,
        data: Map<String, Value>,
    ) -> Result<String, AppError> {
        let ids = self.commit(WriteBatch::new().insert(collection, data)).await?;
        ids.into_iter()
            .next()
            .ok_or_else(|| AppError::Internal("Insert returned no id".to_string()))
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<(), AppError> {
        self.commit(WriteBatch::new().update(collection, id, patch))
            .await
            .map(|_| ())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), AppError> {
        self.commit(WriteBatch::new().delete(collection, id))
            .await
            .map(|_| ())
    }
}

/// Apply a batch to in-memory working copies of the touched collections.
///
/// Both variants run their batches through this so they reject exactly the same writes.
/// `next_id` supplies ids for inserted documents.
pub(crate) fn apply_batch(
    working: &mut std::collections::HashMap<Collection, Vec<Document>>,
    batch: &WriteBatch,
    mut next_id: impl FnMut() -> String,
) -> Result<Vec<String>, AppError> {
    let mut inserted = Vec::new();

    for op in batch.ops() {
        let docs = working.entry(op.collection()).or_default();
        match op {
            WriteOp::Insert { data, .. } => {
                let id = next_id();
                docs.push(Document::new(id.clone(), data.clone()));
                inserted.push(id);
            }
            WriteOp::InsertUnique {
                collection,
                data,
                unique_on,
            } => {
                let duplicate = docs.iter().any(|doc| {
                    unique_on
                        .iter()
                        .all(|field| doc.get(field).is_some() && doc.get(field) == data.get(field))
                });
                if duplicate {
                    return Err(AppError::Conflict(format!(
                        "Duplicate {} on ({})",
                        collection.name(),
                        unique_on.join(", ")
                    )));
                }
                let id = next_id();
                docs.push(Document::new(id.clone(), data.clone()));
                inserted.push(id);
            }
            WriteOp::Update {
                collection,
                id,
                patch,
            } => {
                let doc = find_mut(docs, *collection, id)?;
                for (key, value) in patch {
                    if key != "id" {
                        doc.data.insert(key.clone(), value.clone());
                    }
                }
            }
            WriteOp::IncrementBounded {
                collection,
                id,
                field,
                limit_field,
            } => {
                let doc = find_mut(docs, *collection, id)?;
                let current = doc.get(field).and_then(Value::as_u64).unwrap_or(0);
                let limit = doc.get(limit_field).and_then(Value::as_u64).unwrap_or(0);
                if current >= limit {
                    return Err(AppError::LimitReached(format!(
                        "{} {} reached {} ({})",
                        collection.name(),
                        id,
                        limit_field,
                        limit
                    )));
                }
                doc.data
                    .insert(field.clone(), Value::from(current + 1));
            }
            WriteOp::Guard {
                collection,
                id,
                field,
                at_most,
            } => {
                let doc = find_mut(docs, *collection, id)?;
                let current = doc.get(field).and_then(Value::as_u64).unwrap_or(0);
                if current > *at_most {
                    return Err(AppError::LimitReached(format!(
                        "{} {} has {} {} (at most {})",
                        collection.name(),
                        id,
                        field,
                        current,
                        at_most
                    )));
                }
            }
            WriteOp::Delete { collection, id } => {
                let before = docs.len();
                docs.retain(|doc| doc.id != *id);
                if docs.len() == before {
                    return Err(AppError::NotFound(format!(
                        "{} {} not found",
                        collection.name(),
                        id
                    )));
                }
            }
            WriteOp::DeleteWhere { filter, .. } => {
                docs.retain(|doc| !filter.matches(doc));
            }
        }
    }

    Ok(inserted)
}

fn find_mut<'a>(
    docs: &'a mut [Document],
    collection: Collection,
    id: &str,
) -> Result<&'a mut Document, AppError> {
    docs.iter_mut()
        .find(|doc| doc.id == id)
        .ok_or_else(|| AppError::NotFound(format!("{} {} not found", collection.name(), id)))
}
