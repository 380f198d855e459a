//! Tool surface exposed over MCP.
//!
//! Each tool takes a JSON argument object and produces a JSON value. The
//! registry renders that value as pretty-printed text; failures become an
//! `{"error": ...}` document so the calling model can read them.

pub mod chroma;
pub mod prompt;
pub mod python;
pub mod text;

use crate::config::Config;
use crate::embeddings::EmbeddingError;
use crate::protocol::{CallToolResult, TextContent, ToolDefinition};
use crate::store::{StoreError, VectorStore};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use sha2::Digest;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Execution(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("API request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl ToolError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArguments(msg.into())
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the argument object.
    fn input_schema(&self) -> Value;

    async fn execute(&self, args: Value) -> Result<Value, ToolError>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Deserialize a tool's argument object into its typed form.
pub fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| ToolError::invalid(e.to_string()))
}

/// JSON Schema for an argument struct, minus the draft marker.
pub fn schema_for<T: JsonSchema>() -> Value {
    let mut schema = serde_json::to_value(schemars::schema_for!(T))
        .unwrap_or_else(|_| json!({ "type": "object" }));
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
    }
    schema
}

/// Short stable hash of a tool's arguments, for logs.
pub fn arguments_hash(args: &Value) -> String {
    let digest = sha2::Sha256::digest(args.to_string().as_bytes());
    hex::encode(&digest[..8])
}

/// Tools served by one process, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every tool the toolbox ships, wired to `store` and `config`.
    pub fn with_defaults(config: &Config, store: Arc<dyn VectorStore>) -> Self {
        let mut registry = Self::new();
        registry.register(chroma::ChromaAddTool::new(store.clone()));
        registry.register(chroma::ChromaQueryTool::new(store));
        registry.register(text::CountParagraphsTool);
        registry.register(text::CountSentencesTool);
        registry.register(text::CountTokensTool);
        registry.register(text::ChunkTextFileTool);
        registry.register(python::RunPythonCodeTool::new(config.python.clone()));
        registry.register(prompt::RewritePromptTool::new(config.llm.clone()));
        registry
    }

    /// Add a tool. A tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(Box::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub async fn call(&self, name: &str, args: Value) -> CallToolResult {
        let Some(tool) = self.get(name) else {
            tracing::warn!(tool = name, "unknown tool requested");
            return CallToolResult {
                content: vec![TextContent::new(format!("Unknown tool: {name}"))],
                is_error: true,
            };
        };

        let args_hash = arguments_hash(&args);
        let started = Instant::now();
        let outcome = tool.execute(args).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let body = match outcome {
            Ok(value) => {
                tracing::info!(tool = name, args_hash = %args_hash, elapsed_ms, success = true, "tool call");
                value
            }
            Err(e) => {
                tracing::warn!(
                    tool = name,
                    args_hash = %args_hash,
                    elapsed_ms,
                    success = false,
                    "tool call failed: {e}"
                );
                json!({ "error": e.to_string() })
            }
        };

        let text = serde_json::to_string_pretty(&body)
            .unwrap_or_else(|e| format!("{{\"error\": \"serialization failed: {e}\"}}"));
        CallToolResult {
            content: vec![TextContent::new(text)],
            is_error: false,
        }
    }
}
