use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mcp_toolbox::config::Config;
use mcp_toolbox::embeddings::{checked_dimension, generate_embedding, EMBEDDING_DIMENSION};
use mcp_toolbox::server::McpServer;
use mcp_toolbox::store::SqliteVectorStore;
use mcp_toolbox::tools::ToolRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

/// `mcp-toolbox` - local MCP tools over stdio.
#[derive(Parser, Debug)]
#[command(name = "mcp-toolbox")]
#[command(version)]
#[command(about = "Local MCP tool server: embeddings, vector collections, text and code utilities.", long_about = None)]
struct Cli {
    /// Config file (default: ~/.mcp-toolbox/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve MCP over stdin/stdout (default)
    Serve,

    /// Print the embedding of TEXT as a JSON array
    Embed {
        text: String,

        #[arg(long, default_value_t = EMBEDDING_DIMENSION as i64, allow_negative_numbers = true)]
        dimension: i64,
    },

    /// Print the tools/list payload
    Tools,

    /// Print the JSON Schema of the config file
    ConfigSchema,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Schema and embedding output need no config or logging.
    match &cli.command {
        Some(Commands::ConfigSchema) => {
            let schema = schemars::schema_for!(Config);
            println!("{}", serde_json::to_string_pretty(&schema)?);
            return Ok(());
        }
        Some(Commands::Embed { text, dimension }) => {
            let vector = generate_embedding(text, checked_dimension(*dimension)?)?;
            println!("{}", serde_json::to_string(&vector)?);
            return Ok(());
        }
        _ => {}
    }

    let config = Config::load(cli.config.as_deref())?;
    init_tracing(&config);

    if let Some(Commands::Tools) = cli.command {
        // Definitions are static; keep the storage directory untouched.
        let store = Arc::new(SqliteVectorStore::open_in_memory()?);
        let registry = ToolRegistry::with_defaults(&config, store);
        let payload = serde_json::json!({ "tools": registry.definitions() });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    let storage_dir = config.storage_dir();
    let store = Arc::new(
        SqliteVectorStore::open(&storage_dir)
            .with_context(|| format!("opening store at {}", storage_dir.display()))?,
    );
    tracing::info!(db = %store.db_path().display(), "starting mcp-toolbox");
    let registry = ToolRegistry::with_defaults(&config, store);
    McpServer::new(registry).run().await?;
    Ok(())
}

/// Logs go to stderr; stdout carries protocol messages only.
fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
