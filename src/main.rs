//! # doc-chat CLI (`docchat`)
//!
//! Chat with your documents. Upload one or more files, then ask questions
//! answered from their content.
//!
//! ## Usage
//!
//! ```bash
//! docchat --config ./config/docchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docchat chat [files...]` | Interactive chat in the terminal |
//! | `docchat serve` | Start the HTTP server (one session per client) |
//!
//! ## Examples
//!
//! ```bash
//! # Chat about a PDF
//! docchat chat ./handbook.pdf
//!
//! # Serve the JSON API on the configured bind address
//! RUST_LOG=doc_chat=debug docchat serve --config ./config/docchat.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use doc_chat::chat;
use doc_chat::config::{self, Config};
use doc_chat::progress::ProgressMode;
use doc_chat::server;

/// doc-chat: upload documents and chat with a retrieval-augmented assistant.
#[derive(Parser)]
#[command(name = "docchat", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Built-in defaults are used when the file does not exist.
    #[arg(long, global = true, default_value = "./config/docchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat in the terminal.
    ///
    /// Uploads the given files (filtered by `[upload].accepted_extensions`),
    /// then reads questions from stdin, one per line.
    Chat {
        /// Documents to upload before the first question.
        files: Vec<PathBuf>,

        /// Activity output on stderr. Defaults to `human` on a TTY, else `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind` and serves one chat session per client.
    Serve,
}

fn load(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::info!(path = %path.display(), "no config file; using defaults");
        Ok(Config::minimal())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doc_chat=info,docchat=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = load(&cli.config)?;

    match cli.command {
        Commands::Chat { files, progress } => {
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            chat::run_chat(&cfg, &files, progress).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
