//! `chroma_add` and `chroma_query`: document storage and similarity search
//! over the collection store, with embeddings generated locally when the
//! caller does not supply them.

use super::{parse_args, schema_for, Tool, ToolError};
use crate::embeddings::{generate_embedding, validate_embedding, EMBEDDING_DIMENSION};
use crate::store::{MetadataFilter, NewRecord, QueryRequest, VectorStore};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub const ADD_TOOL: &str = "chroma_add";
pub const QUERY_TOOL: &str = "chroma_query";

const DEFAULT_N_RESULTS: i64 = 3;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AddArgs {
    /// Name of the Chroma collection.
    pub collection_name: String,
    /// Documents to store.
    pub documents: Vec<String>,
    /// Optional list of metadata objects aligned with the documents.
    #[serde(default)]
    pub metadatas: Option<Vec<Map<String, Value>>>,
    /// Optional custom identifiers; generated when omitted.
    #[serde(default)]
    pub ids: Option<Vec<String>>,
    /// Optional embeddings matching the documents. If omitted, deterministic
    /// embeddings are generated automatically.
    #[serde(default)]
    pub embeddings: Option<Vec<Vec<f32>>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct QueryArgs {
    /// Name of the Chroma collection to query.
    pub collection_name: String,
    /// One or more query strings; embeddings are generated automatically.
    #[serde(default)]
    pub query_texts: Option<Vec<String>>,
    /// Optional precomputed embeddings to use instead of query_texts.
    #[serde(default)]
    pub query_embeddings: Option<Vec<Vec<f32>>>,
    /// Number of nearest neighbors to return.
    #[serde(default = "default_n_results")]
    #[schemars(range(min = 1))]
    pub n_results: i64,
    /// Optional metadata filter applied before similarity search.
    #[serde(default, rename = "where")]
    pub filter: Option<Value>,
}

fn default_n_results() -> i64 {
    DEFAULT_N_RESULTS
}

fn collection_name(raw: &str) -> Result<String, ToolError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ToolError::invalid("collection_name is required"));
    }
    Ok(name.to_string())
}

fn validate_all(embeddings: &[Vec<f32>]) -> Result<(), ToolError> {
    for embedding in embeddings {
        validate_embedding(embedding, EMBEDDING_DIMENSION)?;
    }
    Ok(())
}

fn embed_all(texts: &[String]) -> Result<Vec<Vec<f32>>, ToolError> {
    texts
        .iter()
        .map(|t| generate_embedding(t, EMBEDDING_DIMENSION).map_err(ToolError::from))
        .collect()
}

async fn blocking<T, F>(f: F) -> Result<T, ToolError>
where
    F: FnOnce() -> Result<T, ToolError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ToolError::Execution(format!("store task failed: {e}")))?
}

pub struct ChromaAddTool {
    store: Arc<dyn VectorStore>,
}

impl ChromaAddTool {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ChromaAddTool {
    fn name(&self) -> &str {
        ADD_TOOL
    }

    fn description(&self) -> &str {
        "Add documents and optional metadata to a Chroma collection."
    }

    fn input_schema(&self) -> Value {
        schema_for::<AddArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: AddArgs = parse_args(args)?;
        let name = collection_name(&args.collection_name)?;

        if args.documents.is_empty() {
            return Err(ToolError::invalid("documents must contain at least one value"));
        }
        let metadatas = args.metadatas.unwrap_or_default();
        let ids = args.ids.unwrap_or_default();
        let embeddings = args.embeddings.unwrap_or_default();

        // Empty optional lists count as absent.
        let lengths: Vec<usize> = [
            args.documents.len(),
            metadatas.len(),
            ids.len(),
            embeddings.len(),
        ]
        .into_iter()
        .filter(|len| *len > 0)
        .collect();
        if lengths.windows(2).any(|w| w[0] != w[1]) {
            return Err(ToolError::invalid(
                "documents, metadatas, ids, and embeddings must be the same length",
            ));
        }

        let ids = if ids.is_empty() {
            args.documents
                .iter()
                .map(|_| uuid::Uuid::new_v4().to_string())
                .collect()
        } else {
            ids
        };

        let embeddings = if embeddings.is_empty() {
            embed_all(&args.documents)?
        } else {
            validate_all(&embeddings)?;
            embeddings
        };

        let mut metadatas = metadatas.into_iter();
        let records: Vec<NewRecord> = args
            .documents
            .into_iter()
            .zip(ids.iter().cloned())
            .zip(embeddings)
            .map(|((document, id), embedding)| NewRecord {
                id,
                document: Some(document),
                metadata: metadatas.next(),
                embedding,
            })
            .collect();

        let store = self.store.clone();
        let target = name.clone();
        let (outcome, total) = blocking(move || {
            let outcome = store.add(&target, records)?;
            let total = store.count(&target)?;
            Ok((outcome, total))
        })
        .await?;
        tracing::info!(
            collection = %name,
            inserted = outcome.inserted,
            skipped = outcome.skipped.len(),
            total,
            "records added"
        );

        let mut result = json!({
            "collection_name": name,
            "count": ids.len(),
            "ids": ids,
            "embedding_dimension": EMBEDDING_DIMENSION,
        });
        if !outcome.skipped.is_empty() {
            result["skipped_ids"] = json!(outcome.skipped);
        }
        Ok(result)
    }
}

pub struct ChromaQueryTool {
    store: Arc<dyn VectorStore>,
}

impl ChromaQueryTool {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ChromaQueryTool {
    fn name(&self) -> &str {
        QUERY_TOOL
    }

    fn description(&self) -> &str {
        "Query a Chroma collection by text or precomputed embeddings."
    }

    fn input_schema(&self) -> Value {
        schema_for::<QueryArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: QueryArgs = parse_args(args)?;
        let name = collection_name(&args.collection_name)?;

        let query_embeddings = args.query_embeddings.unwrap_or_default();
        let query_texts = args.query_texts.unwrap_or_default();

        let embeddings = if !query_embeddings.is_empty() {
            validate_all(&query_embeddings)?;
            query_embeddings
        } else if !query_texts.is_empty() {
            embed_all(&query_texts)?
        } else {
            return Err(ToolError::invalid(
                "either query_texts or query_embeddings must be provided",
            ));
        };

        if args.n_results <= 0 {
            return Err(ToolError::invalid("n_results must be greater than zero"));
        }
        let n_results = usize::try_from(args.n_results).unwrap_or(usize::MAX);

        let filter = match args.filter {
            Some(value) => MetadataFilter::parse(&value)?,
            None => None,
        };

        let query_count = embeddings.len();
        let request = QueryRequest {
            embeddings,
            n_results,
            filter,
        };
        let store = self.store.clone();
        let target = name.clone();
        let results = blocking(move || Ok(store.query(&target, &request)?)).await?;

        Ok(json!({
            "collection_name": name,
            "query_count": query_count,
            "embedding_dimension": EMBEDDING_DIMENSION,
            "results": results,
        }))
    }
}
