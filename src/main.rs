mod commands;

use clap::{Parser, Subcommand};
use neural_memory::Config;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "neural-memory")]
#[command(about = "Persistent note memory with semantic search for MCP clients", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(long, global = true, env = "NEURAL_CONFIG", help = "YAML config file")]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Note database path (overrides config)")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    // ===== Servers =====
    /// Serve the JSON-RPC tools over HTTP
    Serve {
        #[arg(long, help = "Listen host")]
        host: Option<String>,
        #[arg(short, long, help = "Listen port")]
        port: Option<u16>,
    },
    /// Serve the tools over stdio
    #[cfg(feature = "mcp")]
    Mcp,

    // ===== Embedding maintenance =====
    /// Compare current embeddings against the calibration baseline
    #[command(name = "check-embeddings")]
    CheckEmbeddings {
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Overwrite the calibration baseline with the current model
    Recalibrate,
    /// Recompute every stored embedding, then recalibrate
    Reembed,

    // ===== Notes =====
    Stats {
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    List {
        #[arg(long, short, help = "Limit rows")]
        limit: Option<usize>,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    Search {
        query: String,
        #[arg(long, short, default_value_t = 5, help = "Limit results (1-20)")]
        limit: i64,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    Add {
        content: String,
        #[arg(long, short, help = "Category (default: general)")]
        category: Option<String>,
    },
    Delete {
        id: i64,
    },
}

fn main() -> anyhow::Result<()> {
    // stdout is the stdio MCP channel; logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,neural_memory=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            commands::serve::run_http(config)
        }
        #[cfg(feature = "mcp")]
        Commands::Mcp => commands::serve::run_stdio(config),

        Commands::CheckEmbeddings { json } => commands::calibrate::check(config, json),
        Commands::Recalibrate => commands::calibrate::recalibrate(config),
        Commands::Reembed => commands::calibrate::reembed(config),

        Commands::Stats { json } => commands::notes::stats(config, json),
        Commands::List { limit, json } => commands::notes::list(config, limit, json),
        Commands::Search { query, limit, json } => commands::search::run(config, &query, limit, json),
        Commands::Add { content, category } => commands::notes::add(config, &content, category.as_deref()),
        Commands::Delete { id } => commands::notes::delete(config, id),
    }
}
