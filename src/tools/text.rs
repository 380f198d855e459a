//! Local text utilities: paragraph, sentence and token counts, and file
//! chunking.

use super::{parse_args, schema_for, Tool, ToolError};
use async_trait::async_trait;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::LazyLock;

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?؟…]+(?:\s+|$)").expect("sentence regex"));

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+(?:['’]\w+)*").expect("word regex"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    English,
    Persian,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TextArgs {
    /// The text to analyse.
    pub text: String,
}

impl FromStr for Language {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "english" => Ok(Self::English),
            "persian" => Ok(Self::Persian),
            _ => Err(ToolError::invalid("Language must be 'english' or 'persian'")),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LanguageTextArgs {
    /// The text to analyse.
    pub text: String,
    /// Language of the text. Default: english.
    #[serde(default)]
    #[schemars(with = "Option<Language>")]
    pub language: Option<String>,
}

impl LanguageTextArgs {
    fn language(&self) -> Result<Language, ToolError> {
        self.language
            .as_deref()
            .map_or(Ok(Language::default()), str::parse)
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ChunkArgs {
    /// Path to the text file to chunk.
    pub file_path: String,
    /// Size of each chunk in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: i64,
    /// Number of characters shared by consecutive chunks.
    #[serde(default)]
    pub overlap: i64,
}

fn default_chunk_size() -> i64 {
    1000
}

fn require_text(text: &str) -> Result<(), ToolError> {
    if text.is_empty() {
        return Err(ToolError::invalid("Text is required"));
    }
    Ok(())
}

/// Blank-line separated blocks; falls back to non-empty lines.
pub fn count_paragraphs(text: &str) -> usize {
    let blocks = text.split("\n\n").filter(|p| !p.trim().is_empty()).count();
    if blocks > 0 {
        return blocks;
    }
    text.split('\n').filter(|p| !p.trim().is_empty()).count()
}

pub fn count_sentences(text: &str) -> usize {
    SENTENCE_END
        .split(text)
        .filter(|s| !s.trim().is_empty())
        .count()
}

pub fn count_tokens(text: &str) -> usize {
    WORD.find_iter(text).count()
}

/// Split `content` into chunks of `chunk_size` characters where consecutive
/// chunks share `overlap` characters. Requires `overlap < chunk_size`.
pub fn chunk_chars(content: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = content.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end >= chars.len() {
            break;
        }
        start = end - overlap;
    }
    chunks
}

pub struct CountParagraphsTool;

#[async_trait]
impl Tool for CountParagraphsTool {
    fn name(&self) -> &str {
        "count_paragraphs"
    }

    fn description(&self) -> &str {
        "Counts the number of paragraphs in a given text"
    }

    fn input_schema(&self) -> Value {
        schema_for::<TextArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: TextArgs = parse_args(args)?;
        require_text(&args.text)?;
        Ok(json!({
            "paragraph_count": count_paragraphs(&args.text),
            "text_length": args.text.chars().count(),
        }))
    }
}

pub struct CountSentencesTool;

#[async_trait]
impl Tool for CountSentencesTool {
    fn name(&self) -> &str {
        "count_sentences"
    }

    fn description(&self) -> &str {
        "Counts the number of sentences in a given text. Supports English and Persian only."
    }

    fn input_schema(&self) -> Value {
        schema_for::<LanguageTextArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: LanguageTextArgs = parse_args(args)?;
        require_text(&args.text)?;
        let language = args.language()?;
        Ok(json!({
            "sentence_count": count_sentences(&args.text),
            "language": language,
            "text_length": args.text.chars().count(),
        }))
    }
}

pub struct CountTokensTool;

#[async_trait]
impl Tool for CountTokensTool {
    fn name(&self) -> &str {
        "count_tokens"
    }

    fn description(&self) -> &str {
        "Counts the number of tokens (words) in a given text. Supports English and Persian only."
    }

    fn input_schema(&self) -> Value {
        schema_for::<LanguageTextArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: LanguageTextArgs = parse_args(args)?;
        require_text(&args.text)?;
        let language = args.language()?;
        Ok(json!({
            "token_count": count_tokens(&args.text),
            "language": language,
            "text_length": args.text.chars().count(),
        }))
    }
}

pub struct ChunkTextFileTool;

#[async_trait]
impl Tool for ChunkTextFileTool {
    fn name(&self) -> &str {
        "chunk_text_file"
    }

    fn description(&self) -> &str {
        "Splits a text file into chunks of specified size. Returns an array of text chunks."
    }

    fn input_schema(&self) -> Value {
        schema_for::<ChunkArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: ChunkArgs = parse_args(args)?;
        if args.file_path.is_empty() {
            return Err(ToolError::invalid("File path is required"));
        }
        if !tokio::fs::try_exists(&args.file_path).await.unwrap_or(false) {
            return Err(ToolError::invalid(format!("File not found: {}", args.file_path)));
        }
        if args.chunk_size < 1 {
            return Err(ToolError::invalid("Chunk size must be at least 1"));
        }
        let overlap = args.overlap.max(0);
        if overlap >= args.chunk_size {
            return Err(ToolError::invalid("Overlap must be less than chunk size"));
        }

        let content = tokio::fs::read_to_string(&args.file_path).await?;
        let chunk_size = usize::try_from(args.chunk_size).unwrap_or(usize::MAX);
        let overlap_chars = usize::try_from(overlap).unwrap_or(0);
        let chunks = chunk_chars(&content, chunk_size, overlap_chars);

        Ok(json!({
            "file_path": args.file_path,
            "total_chunks": chunks.len(),
            "chunk_size": args.chunk_size,
            "overlap": overlap,
            "total_characters": content.chars().count(),
            "chunks": chunks,
        }))
    }
}
