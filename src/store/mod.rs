pub mod filter;
pub mod schema;
pub mod sqlite;

pub use filter::MetadataFilter;
pub use sqlite::SqliteVectorStore;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("collection name must be provided")]
    EmptyCollectionName,

    #[error("duplicate id in batch: {0}")]
    DuplicateId(String),

    #[error("invalid where filter: {0}")]
    InvalidFilter(String),

    #[error("query embedding has {query} components but collection '{collection}' stores {stored}")]
    DimensionMismatch {
        collection: String,
        query: usize,
        stored: usize,
    },

    #[error("stored embedding for '{0}' is corrupt")]
    CorruptEmbedding(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// A document ready to be written to a collection.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub id: String,
    pub document: Option<String>,
    pub metadata: Option<Map<String, Value>>,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddOutcome {
    pub inserted: usize,
    /// Ids that already existed in the collection and were left untouched.
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub embeddings: Vec<Vec<f32>>,
    pub n_results: usize,
    pub filter: Option<MetadataFilter>,
}

/// Nearest-neighbour results, one inner list per query embedding.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct QueryResult {
    pub ids: Vec<Vec<String>>,
    pub documents: Vec<Vec<Option<String>>>,
    pub metadatas: Vec<Vec<Option<Value>>>,
    pub distances: Vec<Vec<f32>>,
    pub embeddings: Vec<Vec<Vec<f32>>>,
}

impl QueryResult {
    fn push_empty(&mut self) {
        self.ids.push(Vec::new());
        self.documents.push(Vec::new());
        self.metadatas.push(Vec::new());
        self.distances.push(Vec::new());
        self.embeddings.push(Vec::new());
    }
}

/// Persistent store of named collections of embedded documents.
///
/// Collections are created on first write.
pub trait VectorStore: Send + Sync {
    fn add(&self, collection: &str, records: Vec<NewRecord>) -> Result<AddOutcome, StoreError>;

    fn query(&self, collection: &str, request: &QueryRequest) -> Result<QueryResult, StoreError>;

    fn count(&self, collection: &str) -> Result<usize, StoreError>;
}

/// Squared Euclidean distance, the default space of the collection store.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
