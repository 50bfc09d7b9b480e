//! Remote variant: documents in a SQLite database.
//!
//! SQLite is the source of truth. After every commit the touched collections are re-read and
//! pushed to watchers, so subscribers only ever see what the database holds. Every commit also
//! bumps a per-collection version, which a background task polls to pick up writes made by
//! other instances sharing the database file.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Row, Sqlite, Transaction};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::{
    apply_batch, Collection, Document, DocumentStore, Filter, Subscription, Watchers, WriteBatch,
};
use crate::errors::AppError;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            data TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (collection, id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection, seq);")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collection_versions (
            collection TEXT PRIMARY KEY,
            version INTEGER NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// How often the database is checked for commits made by other instances.
pub const SYNC_INTERVAL: Duration = Duration::from_millis(250);

/// Last collection versions this process has published.
type Versions = HashMap<Collection, i64>;

/// Document store over a SQLite pool.
pub struct SqliteDocumentStore {
    pool: SqlitePool,
    watchers: Arc<Watchers>,
    /// Serializes commits and external refreshes; holds the versions already published
    published: Arc<Mutex<Versions>>,
    sync: JoinHandle<()>,
}

impl SqliteDocumentStore {
    /// Wrap a migrated pool, load the initial snapshots and start following external writes.
    ///
    /// Must be called from inside a Tokio runtime.
    pub async fn open(pool: SqlitePool) -> Result<Self, AppError> {
        Self::open_with_interval(pool, SYNC_INTERVAL).await
    }

    pub async fn open_with_interval(pool: SqlitePool, interval: Duration) -> Result<Self, AppError> {
        // Versions first: a write landing in between is picked up again on the first poll.
        let versions = load_versions(&pool).await?;
        let mut initial = HashMap::new();
        for collection in Collection::ALL {
            initial.insert(collection, load_collection(&pool, collection).await?);
        }

        let watchers = Arc::new(Watchers::new(|c| initial.remove(&c).unwrap_or_default()));
        let published = Arc::new(Mutex::new(versions));
        let sync = tokio::spawn(follow_external_writes(
            pool.clone(),
            watchers.clone(),
            published.clone(),
            interval,
        ));

        Ok(Self {
            pool,
            watchers,
            published,
            sync,
        })
    }
}

impl Drop for SqliteDocumentStore {
    fn drop(&mut self) {
        self.sync.abort();
    }
}

/// Re-read a collection and push it to watchers.
///
/// A failed read is logged and watchers keep the previous snapshot.
async fn refresh(pool: &SqlitePool, watchers: &Watchers, collection: Collection) -> bool {
    match load_collection(pool, collection).await {
        Ok(docs) => {
            watchers.publish(collection, docs);
            true
        }
        Err(e) => {
            tracing::error!(
                collection = collection.name(),
                "Failed to refresh snapshot, keeping last known state: {}",
                e
            );
            false
        }
    }
}

/// Poll the version table and republish collections another instance has written.
async fn follow_external_writes(
    pool: SqlitePool,
    watchers: Arc<Watchers>,
    published: Arc<Mutex<Versions>>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let mut seen = published.lock().await;
        let versions = match load_versions(&pool).await {
            Ok(versions) => versions,
            Err(e) => {
                tracing::warn!("Failed to read collection versions: {}", e);
                continue;
            }
        };

        for (collection, version) in versions {
            if seen.get(&collection) == Some(&version) {
                continue;
            }
            if refresh(&pool, &watchers, collection).await {
                tracing::debug!(collection = collection.name(), version, "Picked up external write");
                seen.insert(collection, version);
            }
        }
    }
}

async fn load_versions(pool: &SqlitePool) -> Result<Versions, AppError> {
    let rows = sqlx::query("SELECT collection, version FROM collection_versions")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            let name: String = row.get("collection");
            let collection = Collection::ALL.into_iter().find(|c| c.name() == name)?;
            Some((collection, row.get::<i64, _>("version")))
        })
        .collect())
}

/// Bump a collection's version inside a commit and return the new value.
async fn bump_version(
    tx: &mut Transaction<'_, Sqlite>,
    collection: Collection,
) -> Result<i64, AppError> {
    let row = sqlx::query(
        r#"
        INSERT INTO collection_versions (collection, version) VALUES (?, 1)
        ON CONFLICT (collection) DO UPDATE SET version = version + 1
        RETURNING version
        "#,
    )
    .bind(collection.name())
    .fetch_one(&mut **tx)
    .await?;

    Ok(row.get("version"))
}

async fn load_collection(
    pool: &SqlitePool,
    collection: Collection,
) -> Result<Vec<Document>, AppError> {
    let rows = sqlx::query("SELECT id, data FROM documents WHERE collection = ? ORDER BY seq")
        .bind(collection.name())
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .filter_map(|row| document_from_row(collection, row))
        .collect())
}

async fn load_collection_tx(
    tx: &mut Transaction<'_, Sqlite>,
    collection: Collection,
) -> Result<Vec<Document>, AppError> {
    let rows = sqlx::query("SELECT id, data FROM documents WHERE collection = ? ORDER BY seq")
        .bind(collection.name())
        .fetch_all(&mut **tx)
        .await?;

    Ok(rows
        .iter()
        .filter_map(|row| document_from_row(collection, row))
        .collect())
}

fn document_from_row(collection: Collection, row: &sqlx::sqlite::SqliteRow) -> Option<Document> {
    let id: String = row.get("id");
    let data: String = row.get("data");
    match serde_json::from_str::<Map<String, Value>>(&data) {
        Ok(map) => Some(Document::new(id, map)),
        Err(e) => {
            tracing::warn!(collection = collection.name(), %id, "Unreadable document body: {}", e);
            None
        }
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn query(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Vec<Document>, AppError> {
        let docs = load_collection(&self.pool, collection).await?;
        Ok(docs.into_iter().filter(|doc| filter.matches(doc)).collect())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<Vec<String>, AppError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mut published = self.published.lock().await;
        let touched = batch.touched();
        let mut tx = self.pool.begin().await?;

        // Writing first takes the database write lock before anything is read, so batches from
        // other instances cannot interleave with this read-modify-write.
        let mut versions = Vec::with_capacity(touched.len());
        for collection in &touched {
            versions.push((*collection, bump_version(&mut tx, *collection).await?));
        }

        let mut before = HashMap::new();
        for collection in &touched {
            before.insert(*collection, load_collection_tx(&mut tx, *collection).await?);
        }
        let mut after = before.clone();

        let ids = apply_batch(&mut after, &batch, || uuid::Uuid::new_v4().simple().to_string())?;

        let now = Utc::now().to_rfc3339();
        for collection in &touched {
            let old = before.remove(collection).unwrap_or_default();
            let new = after.remove(collection).unwrap_or_default();
            write_diff(&mut tx, *collection, &old, &new, &now).await?;
        }

        tx.commit().await?;

        // Publish before releasing the lock so snapshots reach watchers in commit order
        for (collection, version) in versions {
            if refresh(&self.pool, &self.watchers, collection).await {
                published.insert(collection, version);
            }
        }
        drop(published);

        Ok(ids)
    }

    fn watch(&self, collection: Collection) -> Subscription {
        self.watchers.subscribe(collection)
    }

    fn kind(&self) -> &'static str {
        "remote"
    }
}

/// Persist the difference between two versions of a collection.
async fn write_diff(
    tx: &mut Transaction<'_, Sqlite>,
    collection: Collection,
    old: &[Document],
    new: &[Document],
    now: &str,
) -> Result<(), AppError> {
    let old_by_id: HashMap<&str, &Document> = old.iter().map(|d| (d.id.as_str(), d)).collect();
    let new_ids: std::collections::HashSet<&str> = new.iter().map(|d| d.id.as_str()).collect();

    for doc in old.iter().filter(|d| !new_ids.contains(d.id.as_str())) {
        sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection.name())
            .bind(&doc.id)
            .execute(&mut **tx)
            .await?;
    }

    for doc in new {
        let body = serde_json::to_string(&doc.data)?;
        match old_by_id.get(doc.id.as_str()) {
            Some(previous) if previous.data == doc.data => {}
            Some(_) => {
                sqlx::query(
                    "UPDATE documents SET data = ?, updated_at = ? WHERE collection = ? AND id = ?",
                )
                .bind(&body)
                .bind(now)
                .bind(collection.name())
                .bind(&doc.id)
                .execute(&mut **tx)
                .await?;
            }
            None => {
                sqlx::query(
                    "INSERT INTO documents (collection, id, data, updated_at) VALUES (?, ?, ?, ?)",
                )
                .bind(collection.name())
                .bind(&doc.id)
                .bind(&body)
                .bind(now)
                .execute(&mut **tx)
                .await?;
            }
        }
    }

    Ok(())
}
