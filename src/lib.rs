//! Local MCP toolbox: a deterministic embedding generator, a SQLite-backed
//! vector collection store, and the tools that expose them over stdio.

pub mod config;
pub mod embeddings;
pub mod protocol;
pub mod server;
pub mod store;
pub mod tools;
