use super::schema;
use super::{
    squared_l2, AddOutcome, NewRecord, QueryRequest, QueryResult, StoreError, VectorStore,
};
use anyhow::Context;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const DB_FILE: &str = "collections.db";

/// Collection store backed by a single SQLite file.
///
/// Queries scan every record of the collection.
pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

struct StoredRecord {
    id: String,
    document: Option<String>,
    metadata: Option<Map<String, Value>>,
    embedding: Vec<f32>,
}

impl SqliteVectorStore {
    /// Open (or create) the collection database at `db_dir/collections.db`.
    pub fn open(db_dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(db_dir)
            .with_context(|| format!("creating storage dir: {}", db_dir.display()))?;

        let db_path = db_dir.join(DB_FILE);
        let conn = Connection::open(&db_path)
            .with_context(|| format!("opening collection db: {}", db_path.display()))?;

        init(&conn)?;
        tracing::debug!(path = %db_path.display(), "collection store opened");
        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// Store that lives only as long as the process. Nothing touches disk.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory collection db")?;
        init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Path to the underlying database file.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

impl VectorStore for SqliteVectorStore {
    fn add(&self, collection: &str, records: Vec<NewRecord>) -> Result<AddOutcome, StoreError> {
        ensure_name(collection)?;

        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            if !seen.insert(record.id.as_str()) {
                return Err(StoreError::DuplicateId(record.id.clone()));
            }
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let collection_id = get_or_create_collection(&tx, collection)?;
        let now = chrono::Utc::now().to_rfc3339();

        let mut outcome = AddOutcome::default();
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO records (
                    collection_id, record_id, document, metadata_json,
                    embedding, dimension, added_at
                ) VALUES (?1,?2,?3,?4,?5,?6,?7)",
            )?;
            for record in &records {
                let metadata_json = record
                    .metadata
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?;
                let changed = stmt.execute(rusqlite::params![
                    collection_id,
                    record.id,
                    record.document,
                    metadata_json,
                    encode_embedding(&record.embedding),
                    record.embedding.len() as i64,
                    now,
                ])?;
                if changed == 0 {
                    tracing::warn!(collection, id = %record.id, "id already exists, skipping");
                    outcome.skipped.push(record.id.clone());
                } else {
                    outcome.inserted += 1;
                }
            }
        }
        tx.commit()?;
        Ok(outcome)
    }

    fn query(&self, collection: &str, request: &QueryRequest) -> Result<QueryResult, StoreError> {
        ensure_name(collection)?;

        let stored = {
            let conn = self.conn.lock();
            match find_collection(&conn, collection)? {
                Some(id) => load_records(&conn, id)?,
                None => Vec::new(),
            }
        };

        let candidates: Vec<&StoredRecord> = stored
            .iter()
            .filter(|r| {
                request
                    .filter
                    .as_ref()
                    .map_or(true, |f| f.matches(r.metadata.as_ref()))
            })
            .collect();

        let mut result = QueryResult::default();
        for query in &request.embeddings {
            if let Some(mismatch) = candidates.iter().find(|r| r.embedding.len() != query.len()) {
                return Err(StoreError::DimensionMismatch {
                    collection: collection.to_string(),
                    query: query.len(),
                    stored: mismatch.embedding.len(),
                });
            }

            let mut scored: Vec<(f32, &StoredRecord)> = candidates
                .iter()
                .map(|r| (squared_l2(query, &r.embedding), *r))
                .collect();
            scored.sort_by(|a, b| a.0.total_cmp(&b.0));
            scored.truncate(request.n_results);

            result.push_empty();
            let last = result.ids.len() - 1;
            for (distance, record) in scored {
                result.ids[last].push(record.id.clone());
                result.documents[last].push(record.document.clone());
                result.metadatas[last].push(record.metadata.clone().map(Value::Object));
                result.distances[last].push(distance);
                result.embeddings[last].push(record.embedding.clone());
            }
        }
        Ok(result)
    }

    fn count(&self, collection: &str) -> Result<usize, StoreError> {
        ensure_name(collection)?;
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records r
             JOIN collections c ON c.id = r.collection_id
             WHERE c.name = ?1",
            [collection],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

fn init(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(schema::PRAGMAS)
        .context("collection PRAGMA setup")?;
    conn.execute_batch(schema::COLLECTIONS_DDL)
        .context("collections DDL")?;
    conn.execute_batch(schema::RECORDS_DDL)
        .context("records DDL")?;
    Ok(())
}

fn ensure_name(collection: &str) -> Result<(), StoreError> {
    if collection.trim().is_empty() {
        return Err(StoreError::EmptyCollectionName);
    }
    Ok(())
}

fn find_collection(conn: &Connection, name: &str) -> Result<Option<i64>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT id FROM collections WHERE name = ?1",
            [name],
            |row| row.get(0),
        )
        .optional()?)
}

fn get_or_create_collection(conn: &Connection, name: &str) -> Result<i64, StoreError> {
    if let Some(id) = find_collection(conn, name)? {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO collections (name, created_at) VALUES (?1, ?2)",
        rusqlite::params![name, chrono::Utc::now().to_rfc3339()],
    )?;
    tracing::info!(collection = name, "created collection");
    Ok(conn.last_insert_rowid())
}

fn load_records(conn: &Connection, collection_id: i64) -> Result<Vec<StoredRecord>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT record_id, document, metadata_json, embedding
         FROM records
         WHERE collection_id = ?1
         ORDER BY id ASC",
    )?;

    let rows = stmt.query_map([collection_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Option<String>>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, Vec<u8>>(3)?,
        ))
    })?;

    let mut results = Vec::new();
    for row in rows {
        let (id, document, metadata_json, blob) = row?;
        let metadata = match metadata_json {
            Some(text) => match serde_json::from_str::<Value>(&text)? {
                Value::Object(map) => Some(map),
                _ => None,
            },
            None => None,
        };
        let embedding =
            decode_embedding(&blob).ok_or_else(|| StoreError::CorruptEmbedding(id.clone()))?;
        results.push(StoredRecord {
            id,
            document,
            metadata,
            embedding,
        });
    }
    Ok(results)
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|c| c.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{generate_embedding, EMBEDDING_DIMENSION};
    use crate::store::MetadataFilter;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(id: &str, text: &str, metadata: Option<Value>) -> NewRecord {
        NewRecord {
            id: id.into(),
            document: Some(text.into()),
            metadata: metadata.and_then(|m| m.as_object().cloned()),
            embedding: generate_embedding(text, EMBEDDING_DIMENSION).unwrap(),
        }
    }

    fn query_for(text: &str, n_results: usize) -> QueryRequest {
        QueryRequest {
            embeddings: vec![generate_embedding(text, EMBEDDING_DIMENSION).unwrap()],
            n_results,
            filter: None,
        }
    }

    #[test]
    fn store_open_creates_database_file() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested").join("chroma");
        let store = SqliteVectorStore::open(&dir).unwrap();
        assert!(store.db_path().exists());
        assert_eq!(store.db_path(), dir.join("collections.db"));
    }

    #[test]
    fn in_memory_store_writes_nothing_to_disk() {
        let store = SqliteVectorStore::open_in_memory().unwrap();
        assert_eq!(store.db_path(), Path::new(":memory:"));
        store.add("notes", vec![record("a", "first note", None)]).unwrap();
        assert_eq!(store.count("notes").unwrap(), 1);
        let result = store.query("notes", &query_for("first note", 1)).unwrap();
        assert_eq!(result.ids, vec![vec!["a".to_string()]]);
    }

    #[test]
    fn add_then_count() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteVectorStore::open(tmp.path()).unwrap();
        let outcome = store
            .add(
                "notes",
                vec![record("a", "first note", None), record("b", "second note", None)],
            )
            .unwrap();
        assert_eq!(outcome.inserted, 2);
        assert!(outcome.skipped.is_empty());
        assert_eq!(store.count("notes").unwrap(), 2);
        assert_eq!(store.count("other").unwrap(), 0);
    }

    #[test]
    fn existing_ids_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteVectorStore::open(tmp.path()).unwrap();
        store.add("notes", vec![record("a", "first", None)]).unwrap();
        let outcome = store
            .add("notes", vec![record("a", "replacement", None), record("b", "new", None)])
            .unwrap();
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.skipped, vec!["a".to_string()]);

        let result = store.query("notes", &query_for("first", 5)).unwrap();
        assert!(result.documents[0].contains(&Some("first".to_string())));
        assert!(!result.documents[0].contains(&Some("replacement".to_string())));
    }

    #[test]
    fn duplicate_ids_in_batch_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteVectorStore::open(tmp.path()).unwrap();
        let err = store
            .add("notes", vec![record("a", "x", None), record("a", "y", None)])
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId(ref id) if id == "a"));
        assert_eq!(store.count("notes").unwrap(), 0);
    }

    #[test]
    fn empty_collection_name_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteVectorStore::open(tmp.path()).unwrap();
        assert!(matches!(
            store.add("  ", vec![record("a", "x", None)]),
            Err(StoreError::EmptyCollectionName)
        ));
    }

    #[test]
    fn exact_text_is_nearest() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteVectorStore::open(tmp.path()).unwrap();
        store
            .add(
                "docs",
                vec![
                    record("rust", "rust ownership and borrowing", None),
                    record("cook", "how to bake sourdough bread", None),
                    record("sea", "whales migrate across oceans", None),
                ],
            )
            .unwrap();

        let result = store
            .query("docs", &query_for("how to bake sourdough bread", 2))
            .unwrap();
        assert_eq!(result.ids.len(), 1);
        assert_eq!(result.ids[0].len(), 2);
        assert_eq!(result.ids[0][0], "cook");
        assert!(result.distances[0][0].abs() < 1e-6);
        assert!(result.distances[0][0] <= result.distances[0][1]);
        assert_eq!(result.embeddings[0][0].len(), EMBEDDING_DIMENSION);
    }

    #[test]
    fn query_returns_one_list_per_embedding() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteVectorStore::open(tmp.path()).unwrap();
        store.add("docs", vec![record("a", "alpha", None)]).unwrap();

        let request = QueryRequest {
            embeddings: vec![
                generate_embedding("alpha", EMBEDDING_DIMENSION).unwrap(),
                generate_embedding("beta", EMBEDDING_DIMENSION).unwrap(),
            ],
            n_results: 3,
            filter: None,
        };
        let result = store.query("docs", &request).unwrap();
        assert_eq!(result.ids, vec![vec!["a".to_string()], vec!["a".to_string()]]);
    }

    #[test]
    fn query_on_unknown_collection_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteVectorStore::open(tmp.path()).unwrap();
        let result = store.query("missing", &query_for("anything", 3)).unwrap();
        assert_eq!(result.ids, vec![Vec::<String>::new()]);
    }

    #[test]
    fn filter_restricts_candidates() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteVectorStore::open(tmp.path()).unwrap();
        store
            .add(
                "docs",
                vec![
                    record("en", "hello there", Some(json!({"lang": "en"}))),
                    record("fa", "salam", Some(json!({"lang": "fa"}))),
                    record("bare", "hello there", None),
                ],
            )
            .unwrap();

        let mut request = query_for("hello there", 10);
        request.filter = MetadataFilter::parse(&json!({"lang": "fa"})).unwrap();
        let result = store.query("docs", &request).unwrap();
        assert_eq!(result.ids[0], vec!["fa".to_string()]);
        assert_eq!(result.metadatas[0][0], Some(json!({"lang": "fa"})));
    }

    #[test]
    fn mismatched_query_dimension_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteVectorStore::open(tmp.path()).unwrap();
        store.add("docs", vec![record("a", "alpha", None)]).unwrap();
        let request = QueryRequest {
            embeddings: vec![vec![0.0; 4]],
            n_results: 1,
            filter: None,
        };
        assert!(matches!(
            store.query("docs", &request),
            Err(StoreError::DimensionMismatch { query: 4, stored: 128, .. })
        ));
    }

    #[test]
    fn records_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let store = SqliteVectorStore::open(tmp.path()).unwrap();
            store
                .add("docs", vec![record("a", "persisted", Some(json!({"n": 1})))])
                .unwrap();
        }
        let store = SqliteVectorStore::open(tmp.path()).unwrap();
        assert_eq!(store.count("docs").unwrap(), 1);
        let result = store.query("docs", &query_for("persisted", 1)).unwrap();
        assert_eq!(result.metadatas[0][0], Some(json!({"n": 1})));
    }

    #[test]
    fn embedding_blob_encoding_is_little_endian() {
        let bytes = encode_embedding(&[1.0, -2.5]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        assert_eq!(decode_embedding(&bytes).unwrap(), vec![1.0, -2.5]);
        assert!(decode_embedding(&bytes[..5]).is_none());
    }
}
