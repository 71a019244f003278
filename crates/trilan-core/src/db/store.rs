//! Durable local store for the three glossary collections
//!
//! Every read and write is synchronous and hits `SQLite` before returning.
//! Mutations report the changed collection to a single registered
//! [`ChangeListener`] once the write is committed; the store itself knows
//! nothing about sync.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Transaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::Database;
use crate::error::{Error, Result};
use crate::models::{find_duplicate_id, Category, Collection, Document, GlossaryEntry, RecordId};
use crate::search::{filter_documents, Lookup};
use crate::util::iso_timestamp;

/// Receives a notification after each committed mutation
pub trait ChangeListener: Send + Sync {
    fn collection_changed(&self, collection: Collection);
}

impl<F> ChangeListener for F
where
    F: Fn(Collection) + Send + Sync,
{
    fn collection_changed(&self, collection: Collection) {
        self(collection);
    }
}

/// Record counts per collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub categories: usize,
    pub dictionary: usize,
    pub phrases: usize,
}

/// Synchronous, write-through store holding categories, dictionary and phrases
pub struct LocalStore {
    db: Mutex<Database>,
    listener: RwLock<Option<Arc<dyn ChangeListener>>>,
}

impl LocalStore {
    pub fn new(db: Database) -> Self {
        Self {
            db: Mutex::new(db),
            listener: RwLock::new(None),
        }
    }

    /// Open (or create) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    /// Open an in-memory store (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    /// Register the change listener, replacing any previous one.
    pub fn set_change_listener(&self, listener: Arc<dyn ChangeListener>) {
        *self
            .listener
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(listener);
    }

    pub fn clear_change_listener(&self) {
        *self
            .listener
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
    }

    /// All records of `collection` in insertion order.
    pub fn get(&self, collection: Collection) -> Result<Vec<Document>> {
        let db = self.lock()?;
        read_collection(db.connection(), collection)
    }

    /// All records of `collection`, decoded into a typed record.
    pub fn get_as<R: DeserializeOwned>(&self, collection: Collection) -> Result<Vec<R>> {
        self.get(collection)?
            .iter()
            .map(Document::to_record)
            .collect()
    }

    pub fn categories(&self) -> Result<Vec<Category>> {
        self.get_as(Collection::Categories)
    }

    /// Typed view of the dictionary or phrase collection.
    pub fn entries(&self, collection: Collection) -> Result<Vec<GlossaryEntry>> {
        if !collection.holds_entries() {
            return Err(Error::InvalidInput(format!(
                "'{collection}' does not hold glossary entries"
            )));
        }
        self.get_as(collection)
    }

    /// Discard every record of `collection` and store `records` in their place.
    pub fn replace(&self, collection: Collection, records: Vec<Document>) -> Result<()> {
        self.replace_many(vec![(collection, records)])
    }

    /// Replace several collections in one transaction; nothing is written if any fails.
    pub fn replace_many(&self, sets: Vec<(Collection, Vec<Document>)>) -> Result<()> {
        for (collection, records) in &sets {
            if let Some(id) = find_duplicate_id(records) {
                return Err(Error::InvalidInput(format!(
                    "duplicate id {id} in replacement for '{collection}'"
                )));
            }
        }

        {
            let mut db = self.lock()?;
            let tx = db.connection_mut().transaction()?;
            for (collection, records) in &sets {
                write_collection(&tx, *collection, records)?;
            }
            tx.commit()?;
        }

        for (collection, records) in &sets {
            tracing::debug!(
                "Replaced {} with {} record(s)",
                collection,
                records.len()
            );
            self.notify(*collection);
        }
        Ok(())
    }

    /// Append a new record built from `draft`, assigning `id` and `createdAt`.
    pub fn add<D: Serialize>(&self, collection: Collection, draft: &D) -> Result<Document> {
        let Value::Object(mut fields) = serde_json::to_value(draft)? else {
            return Err(Error::InvalidInput("new record must be an object".into()));
        };

        let document = {
            let mut db = self.lock()?;
            let tx = db.connection_mut().transaction()?;

            let id = next_id(&tx, collection)?;
            fields.insert("id".to_string(), Value::from(id.get()));
            fields.insert(
                "createdAt".to_string(),
                Value::from(iso_timestamp(Utc::now())),
            );
            let document = Document::try_from(fields).map_err(Error::InvalidInput)?;

            let position: i64 = tx.query_row(
                "SELECT COALESCE(MAX(position) + 1, 0) FROM records WHERE collection = ?",
                params![collection.as_str()],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO records (collection, id, position, body) VALUES (?, ?, ?, ?)",
                params![
                    collection.as_str(),
                    id.get(),
                    position,
                    serde_json::to_string(&document)?
                ],
            )?;
            raise_high_water_mark(&tx, collection, id)?;
            tx.commit()?;
            document
        };

        self.notify(collection);
        Ok(document)
    }

    /// Merge `patch` into record `id` and refresh `updatedAt`.
    ///
    /// Returns `false` (and writes nothing) when the id is not present.
    pub fn update<P: Serialize>(
        &self,
        collection: Collection,
        id: RecordId,
        patch: &P,
    ) -> Result<bool> {
        let Value::Object(patch) = serde_json::to_value(patch)? else {
            return Err(Error::InvalidInput("record patch must be an object".into()));
        };

        {
            let mut db = self.lock()?;
            let tx = db.connection_mut().transaction()?;

            let body: Option<String> = tx
                .query_row(
                    "SELECT body FROM records WHERE collection = ? AND id = ?",
                    params![collection.as_str(), id.get()],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(body) = body else {
                return Ok(false);
            };

            let mut document: Document = serde_json::from_str(&body)?;
            document.merge(patch);
            document.set("updatedAt", Value::from(iso_timestamp(Utc::now())));

            tx.execute(
                "UPDATE records SET body = ? WHERE collection = ? AND id = ?",
                params![
                    serde_json::to_string(&document)?,
                    collection.as_str(),
                    id.get()
                ],
            )?;
            tx.commit()?;
        }

        self.notify(collection);
        Ok(true)
    }

    /// Remove record `id` if present. Returns whether a record was removed.
    pub fn delete(&self, collection: Collection, id: RecordId) -> Result<bool> {
        let removed = {
            let db = self.lock()?;
            db.connection().execute(
                "DELETE FROM records WHERE collection = ? AND id = ?",
                params![collection.as_str(), id.get()],
            )?
        };

        self.notify(collection);
        Ok(removed > 0)
    }

    /// Case-insensitive substring search across the four language fields.
    ///
    /// An empty query returns the whole collection.
    pub fn search(&self, collection: Collection, query: &str) -> Result<Vec<Document>> {
        Ok(filter_documents(self.get(collection)?, query))
    }

    /// Search the dictionary and phrase collections together.
    pub fn lookup(&self, query: &str) -> Result<Lookup> {
        Ok(Lookup {
            dictionary: self.search(Collection::Dictionary, query)?,
            phrases: self.search(Collection::Phrases, query)?,
        })
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let db = self.lock()?;
        let count = |collection: Collection| -> Result<usize> {
            let count: i64 = db.connection().query_row(
                "SELECT COUNT(*) FROM records WHERE collection = ?",
                params![collection.as_str()],
                |row| row.get(0),
            )?;
            Ok(usize::try_from(count).unwrap_or_default())
        };

        Ok(StoreStats {
            categories: count(Collection::Categories)?,
            dictionary: count(Collection::Dictionary)?,
            phrases: count(Collection::Phrases)?,
        })
    }

    /// Whether the dictionary or phrase collection holds anything.
    pub fn has_entries(&self) -> Result<bool> {
        let stats = self.stats()?;
        Ok(stats.dictionary > 0 || stats.phrases > 0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|_| Error::LockPoisoned)
    }

    fn notify(&self, collection: Collection) {
        let listener = self
            .listener
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            listener.collection_changed(collection);
        }
    }
}

fn read_collection(conn: &rusqlite::Connection, collection: Collection) -> Result<Vec<Document>> {
    let mut stmt =
        conn.prepare("SELECT body FROM records WHERE collection = ? ORDER BY position ASC")?;
    let bodies = stmt
        .query_map(params![collection.as_str()], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    bodies
        .iter()
        .map(|body| Ok(serde_json::from_str(body)?))
        .collect()
}

fn write_collection(tx: &Transaction<'_>, collection: Collection, records: &[Document]) -> Result<()> {
    tx.execute(
        "DELETE FROM records WHERE collection = ?",
        params![collection.as_str()],
    )?;

    let mut insert =
        tx.prepare("INSERT INTO records (collection, id, position, body) VALUES (?, ?, ?, ?)")?;
    for (position, record) in records.iter().enumerate() {
        insert.execute(params![
            collection.as_str(),
            record.id().get(),
            i64::try_from(position).unwrap_or(i64::MAX),
            serde_json::to_string(record)?
        ])?;
    }

    if let Some(max_id) = records.iter().map(Document::id).max() {
        raise_high_water_mark(tx, collection, max_id)?;
    }
    Ok(())
}

/// Next id for `collection`: the current millisecond timestamp, bumped past
/// every id the collection has ever held.
fn next_id(tx: &Transaction<'_>, collection: Collection) -> Result<RecordId> {
    let last_id: i64 = tx
        .query_row(
            "SELECT last_id FROM collection_meta WHERE collection = ?",
            params![collection.as_str()],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0);

    let now = Utc::now().timestamp_millis();
    Ok(RecordId::new(now.max(last_id.saturating_add(1))))
}

fn raise_high_water_mark(tx: &Transaction<'_>, collection: Collection, id: RecordId) -> Result<()> {
    tx.execute(
        "INSERT INTO collection_meta (collection, last_id) VALUES (?1, ?2)
         ON CONFLICT(collection) DO UPDATE SET last_id = MAX(last_id, ?2)",
        params![collection.as_str(), id.get()],
    )?;
    Ok(())
}
