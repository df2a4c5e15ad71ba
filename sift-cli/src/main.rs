use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sift::{Client, ClientConfig};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::DocumentSource;

#[derive(Parser, Debug)]
#[command(name = "sift")]
#[command(about = "Sift CLI - cluster-aware search client tools")]
#[command(version)]
struct Cli {
    /// Seed URL (repeatable); overrides the config file
    #[arg(short, long = "url", global = true, env = "SIFT_URL")]
    urls: Vec<String>,

    /// TOML client configuration
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use the seed URLs as given instead of discovering the cluster
    #[arg(long, global = true)]
    no_sniff: bool,

    /// Retries after the first attempt of each request
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the nodes the client routes to
    Nodes {
        /// Also print the node-info answer of the cluster
        #[arg(long)]
        info: bool,
    },

    /// Show cluster health
    Health {
        /// Wait for this status (green or yellow) before printing
        #[arg(long)]
        wait_for: Option<String>,

        /// Server-side wait timeout, e.g. "30s"
        #[arg(long, default_value = "30s")]
        timeout: String,
    },

    /// Bulk-index JSONL documents
    Bulk {
        /// Target index
        #[arg(short, long)]
        index: String,

        /// Document type
        #[arg(short = 't', long = "type", default_value = "doc")]
        doc_type: String,

        /// JSONL input file (stdin if omitted)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Field holding the document id; the server assigns one otherwise
        #[arg(long)]
        id_field: Option<String>,

        /// Actions per bulk request
        #[arg(long, default_value = "500")]
        batch_size: usize,

        /// Refresh the index after each batch
        #[arg(long)]
        refresh: bool,
    },

    /// Stream every matching document as JSON lines
    Scroll {
        /// Indices to read (comma-separated)
        #[arg(short, long)]
        index: String,

        /// Document types (comma-separated)
        #[arg(short = 't', long = "type")]
        doc_type: Option<String>,

        /// Query as JSON; match_all when omitted
        #[arg(short, long)]
        query: Option<String>,

        /// Hits per shard per page
        #[arg(long, default_value = "100")]
        size: usize,

        /// Context lease renewed on every page
        #[arg(long, default_value = sift::scroll::DEFAULT_KEEP_ALIVE)]
        keep_alive: String,

        /// Print whole hits instead of sources
        #[arg(long)]
        hits: bool,
    },
}

impl Cli {
    fn client_config(&self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => ClientConfig::default(),
        };
        if !self.urls.is_empty() {
            config.urls = self.urls.clone();
        }
        if self.no_sniff {
            config.sniff_enabled = false;
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.client_config()?;
    let client = Client::new(config)
        .await
        .context("Failed to connect to the cluster")?;

    let result = match cli.command {
        Commands::Nodes { info } => commands::run_nodes(&client, info).await,
        Commands::Health { wait_for, timeout } => {
            commands::run_health(&client, wait_for.as_deref(), &timeout).await
        }
        Commands::Bulk {
            index,
            doc_type,
            input,
            id_field,
            batch_size,
            refresh,
        } => {
            let source = match input {
                Some(path) => DocumentSource::FromFile(path),
                None => DocumentSource::FromStdin,
            };
            commands::run_bulk(
                &client,
                &index,
                &doc_type,
                source,
                id_field.as_deref(),
                batch_size,
                refresh,
            )
            .await
        }
        Commands::Scroll {
            index,
            doc_type,
            query,
            size,
            keep_alive,
            hits,
        } => {
            let query = query
                .map(|q| serde_json::from_str(&q))
                .transpose()
                .context("Query is not valid JSON")?;
            commands::run_scroll(
                &client,
                &index,
                doc_type.as_deref(),
                query,
                size,
                &keep_alive,
                hits,
            )
            .await
        }
    };

    client.stop().await;
    result
}
