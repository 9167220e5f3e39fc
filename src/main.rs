use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ragdelta::config::Config;
use ragdelta::indexer::DeltaIndexer;
use ragdelta::indexer::chunker::TextSplitter;
use ragdelta::mcp::server::{McpContext, McpServer};
use ragdelta::provider::Provider;
use ragdelta::rag::RagService;
use ragdelta::store::IndexStore;
use ragdelta::store::sqlite::SqliteIndexStore;
use ragdelta::versioning;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Incremental RAG indexing backend.
#[derive(Parser)]
#[command(name = "ragdelta", version, about)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, global = true, default_value = "config.json")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the MCP tools over stdio
    Serve,

    /// Delta-scan the index directory into the vector index
    Embed {
        /// Scope newly indexed chunks to this user
        #[arg(long)]
        user_id: Option<String>,
    },

    /// Search the index and optionally generate an answer
    Search {
        query: String,

        /// Only return chunks indexed for this user
        #[arg(long)]
        user_id: Option<String>,

        /// Skip answer generation
        #[arg(long)]
        no_answer: bool,
    },

    /// Save a file's next version from the content of another file
    Save {
        file: PathBuf,

        /// File holding the new content
        #[arg(long = "from")]
        from: PathBuf,
    },
}

/// Components shared by every command that touches the index.
struct App {
    config: Arc<Config>,
    indexer: DeltaIndexer,
    rag: Arc<RagService>,
}

impl App {
    fn build(config: Config, with_generator: bool) -> Result<Self> {
        let provider = Provider::from_config(&config.provider).context("invalid provider setup")?;
        let embedder = provider.embedder().context("failed to create embedder")?;

        let store: Arc<dyn IndexStore> = Arc::new(
            SqliteIndexStore::open(&config.db_path, embedder).context("failed to open index")?,
        );

        let generator = if with_generator {
            Some(provider.generator().context("failed to create generator")?)
        } else {
            None
        };

        let splitter = TextSplitter::new(config.chunk_size, config.chunk_overlap);
        let indexer = DeltaIndexer::new(store.clone(), splitter);
        let rag = Arc::new(RagService::new(store, generator, config.search_top_k));

        Ok(Self {
            config: Arc::new(config),
            indexer,
            rag,
        })
    }
}

/// Install the stderr subscriber before anything else logs.
///
/// Returns a handle for swapping in the configured level, or `None` when
/// `RUST_LOG` is set and takes precedence.
fn init_logging() -> Option<FilterHandle> {
    // stdout carries MCP traffic
    let from_env = EnvFilter::try_from_default_env().ok();
    let overridable = from_env.is_none();
    let (filter, handle) = reload::Layer::new(from_env.unwrap_or_else(|| EnvFilter::new("info")));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    overridable.then_some(handle)
}

fn apply_log_level(handle: Option<&FilterHandle>, level: &str) {
    let Some(handle) = handle else {
        return;
    };
    if let Err(e) = handle.reload(EnvFilter::new(level)) {
        warn!("Failed to apply log level {level:?}: {e}");
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_filter = init_logging();
    let config = Config::load_with_env(&cli.config)?;
    apply_log_level(log_filter.as_ref(), &config.log_level);

    info!("ragdelta {} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Serve => {
            let app = App::build(config, true)?;
            let ctx = McpContext {
                config: app.config.clone(),
                indexer: app.indexer.clone(),
                rag: app.rag.clone(),
            };

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")?;
            runtime.block_on(McpServer::new(ctx).start())?;
        }
        Command::Embed { user_id } => {
            let app = App::build(config, false)?;
            let summary = app
                .indexer
                .run(&app.config.index_root(), user_id.as_deref())?;
            print_json(&summary)?;
        }
        Command::Search {
            query,
            user_id,
            no_answer,
        } => {
            let app = App::build(config, !no_answer)?;
            let response = app.rag.search(&query, user_id.as_deref(), !no_answer)?;
            print_json(&response)?;
        }
        Command::Save { file, from } => {
            let content = std::fs::read_to_string(&from)
                .with_context(|| format!("failed to read {}", from.display()))?;
            let saved = versioning::save_new_version(&file, &content)
                .with_context(|| format!("failed to save a new version of {}", file.display()))?;
            println!("{}", saved.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();

        let cli = Cli::try_parse_from(["ragdelta", "search", "what changed", "--no-answer"]).unwrap();
        assert_eq!(cli.config, "config.json");
        assert!(matches!(
            cli.command,
            Command::Search { no_answer: true, .. }
        ));
    }

    #[test]
    fn test_configured_level_replaces_bootstrap_filter() {
        let (filter, handle) = reload::Layer::new(EnvFilter::new("info"));
        let subscriber = tracing_subscriber::registry().with(filter);

        tracing::subscriber::with_default(subscriber, || {
            assert!(!tracing::enabled!(tracing::Level::DEBUG));
            apply_log_level(Some(&handle), "debug");
            tracing::callsite::rebuild_interest_cache();
            assert!(tracing::enabled!(tracing::Level::DEBUG));
        });

        // Without a handle the call is a no-op
        apply_log_level(None, "trace");
    }
}
