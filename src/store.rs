use rusqlite::{Connection, OptionalExtension};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::Result;

pub type Document = Map<String, Value>;

/// One keyed write. With `merge` the fields are laid over any existing document,
/// otherwise the document is replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct Upsert {
    pub collection: String,
    pub key: String,
    pub fields: Document,
    pub merge: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    pub upserts: Vec<Upsert>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, collection: &str, key: String, fields: Document) {
        self.upserts.push(Upsert {
            collection: collection.to_string(),
            key,
            fields,
            merge: true,
        });
    }

    pub fn len(&self) -> usize {
        self.upserts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty()
    }
}

fn merge_into(existing: Option<Document>, upsert: &Upsert) -> Document {
    match existing {
        Some(mut base) if upsert.merge => {
            for (k, v) in &upsert.fields {
                base.insert(k.clone(), v.clone());
            }
            base
        }
        _ => upsert.fields.clone(),
    }
}

/// Keyed document storage the import writes into. A committed batch is
/// all-or-nothing.
pub trait DocumentStore {
    fn commit(&mut self, batch: &WriteBatch) -> Result<()>;
    fn get(&self, collection: &str, key: &str) -> Result<Option<Document>>;
    fn list(&self, collection: &str) -> Result<Vec<(String, Document)>>;
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Document count per collection, for status output.
    pub fn collection_counts(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT collection, count(*) FROM documents GROUP BY collection ORDER BY collection",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn read_fields(conn: &Connection, collection: &str, key: &str) -> Result<Option<Document>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT fields FROM documents WHERE collection = ?1 AND key = ?2",
            rusqlite::params![collection, key],
            |row| row.get(0),
        )
        .optional()?;
    match raw {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

impl DocumentStore for SqliteStore {
    fn commit(&mut self, batch: &WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        for upsert in &batch.upserts {
            let existing = read_fields(&tx, &upsert.collection, &upsert.key)?;
            let fields = merge_into(existing, upsert);
            tx.execute(
                "INSERT INTO documents (collection, key, fields) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(collection, key) DO UPDATE SET fields = excluded.fields, \
                 updated_at = datetime('now')",
                rusqlite::params![upsert.collection, upsert.key, Value::Object(fields).to_string()],
            )?;
        }
        tx.commit()?;
        debug!(upserts = batch.len(), "committed batch");
        Ok(())
    }

    fn get(&self, collection: &str, key: &str) -> Result<Option<Document>> {
        read_fields(&self.conn, collection, key)
    }

    fn list(&self, collection: &str) -> Result<Vec<(String, Document)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, fields FROM documents WHERE collection = ?1 ORDER BY key")?;
        let rows: Vec<(String, String)> = stmt
            .query_map([collection], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(key, json)| -> Result<(String, Document)> {
                Ok((key, serde_json::from_str(&json)?))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// In-memory (tests)
// ---------------------------------------------------------------------------

#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub docs: std::collections::BTreeMap<(String, String), Document>,
    pub commits: usize,
}

#[cfg(test)]
impl DocumentStore for MemoryStore {
    fn commit(&mut self, batch: &WriteBatch) -> Result<()> {
        for upsert in &batch.upserts {
            let id = (upsert.collection.clone(), upsert.key.clone());
            let existing = self.docs.remove(&id);
            self.docs.insert(id, merge_into(existing, upsert));
        }
        self.commits += 1;
        Ok(())
    }

    fn get(&self, collection: &str, key: &str) -> Result<Option<Document>> {
        Ok(self
            .docs
            .get(&(collection.to_string(), key.to_string()))
            .cloned())
    }

    fn list(&self, collection: &str) -> Result<Vec<(String, Document)>> {
        Ok(self
            .docs
            .iter()
            .filter(|((c, _), _)| c == collection)
            .map(|((_, k), d)| (k.clone(), d.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_connection, init_db};
    use serde_json::json;

    fn test_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, SqliteStore::new(conn))
    }

    fn doc(v: Value) -> Document {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn test_upsert_inserts_then_merges() {
        let (_dir, mut store) = test_store();
        let mut batch = WriteBatch::new();
        batch.set("things", "u:a".into(), doc(json!({"name": "A", "depth": 1})));
        store.commit(&batch).unwrap();

        let mut batch = WriteBatch::new();
        batch.set("things", "u:a".into(), doc(json!({"depth": 2, "extra": true})));
        store.commit(&batch).unwrap();

        let got = store.get("things", "u:a").unwrap().unwrap();
        assert_eq!(Value::Object(got), json!({"name": "A", "depth": 2, "extra": true}));
        assert_eq!(store.list("things").unwrap().len(), 1);
    }

    #[test]
    fn test_replace_without_merge() {
        let (_dir, mut store) = test_store();
        let mut batch = WriteBatch::new();
        batch.set("things", "k".into(), doc(json!({"a": 1})));
        store.commit(&batch).unwrap();
        let batch = WriteBatch {
            upserts: vec![Upsert {
                collection: "things".into(),
                key: "k".into(),
                fields: doc(json!({"b": 2})),
                merge: false,
            }],
        };
        store.commit(&batch).unwrap();
        let got = store.get("things", "k").unwrap().unwrap();
        assert_eq!(Value::Object(got), json!({"b": 2}));
    }

    #[test]
    fn test_empty_batch_is_a_no_op() {
        let (_dir, mut store) = test_store();
        let before = store.collection_counts().unwrap();
        store.commit(&WriteBatch::new()).unwrap();
        assert_eq!(store.collection_counts().unwrap(), before);
    }

    #[test]
    fn test_missing_document() {
        let (_dir, store) = test_store();
        assert!(store.get("things", "nope").unwrap().is_none());
    }

    #[test]
    fn test_collection_counts() {
        let (_dir, store) = test_store();
        let counts = store.collection_counts().unwrap();
        assert!(counts.contains(&("pp_account_types".to_string(), 6)));
    }

    #[test]
    fn test_memory_store_matches_merge_semantics() {
        let mut store = MemoryStore::default();
        let mut batch = WriteBatch::new();
        batch.set("c", "k".into(), doc(json!({"a": 1})));
        batch.set("c", "k".into(), doc(json!({"b": 2})));
        store.commit(&batch).unwrap();
        let got = store.get("c", "k").unwrap().unwrap();
        assert_eq!(Value::Object(got), json!({"a": 1, "b": 2}));
        assert_eq!(store.commits, 1);
    }
}
