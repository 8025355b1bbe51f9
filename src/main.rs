//! # Doc-Chat CLI (`docchat`)
//!
//! ## Usage
//!
//! ```bash
//! docchat --config ./config/docchat.toml serve
//! ```
//!
//! Credentials are read from the environment at startup, never from the
//! config file:
//!
//! - `OPENAI_API_KEY` — embeddings and chat completion (optional; without it
//!   uploads are stored but AI search is disabled)
//! - `MANAGED_SERVICE_KEY` — required when `storage.backend = "managed"`

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use doc_chat::config::load_config;
use doc_chat::server::run_server;

/// Doc-Chat — a multi-tenant document-grounded chat backend.
#[derive(Parser)]
#[command(
    name = "docchat",
    about = "Doc-Chat — upload documents, ask questions, get grounded streamed answers",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind` and serves the upload, documents, analytics,
    /// and query endpoints until the process is terminated.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doc_chat=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => run_server(&config).await?,
    }

    Ok(())
}
