//! ollaweb CLI - drive a local Ollama engine through the coordinator.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use ollaweb_core::{Coordinator, CoordinatorConfig, OllamaConfig, OllamaEngine};

mod commands;

/// ollaweb - start, install and chat with local models
#[derive(Parser)]
#[command(name = "ollaweb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Engine base URL (default: OLLAWEB_OLLAMA_URL, OLLAMA_HOST, or http://127.0.0.1:11434)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Path to the ollama executable
    #[arg(long, global = true)]
    ollama_bin: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a model is installed
    Check {
        /// Model name, e.g. llava or llava:13b
        model: String,
    },

    /// Install a model, showing progress
    Pull {
        /// Model name
        model: String,
    },

    /// Send a message and stream the reply
    Chat {
        /// Message to send
        message: String,
        /// Model to chat with (default: OLLAWEB_MODEL or llama3.2-vision)
        #[arg(short, long)]
        model: Option<String>,
        /// Image to attach to the message
        #[arg(short, long)]
        image: Option<PathBuf>,
        /// Prior turns as a JSON array of {role, content}
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// List installed models
    Models,

    /// Show configuration and paths
    Info,
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose { "debug" } else { "warn" };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let mut engine_config = OllamaConfig::from_env();
    if let Some(url) = &cli.url {
        engine_config = engine_config.with_url(url);
    }
    if let Some(binary) = cli.ollama_bin {
        engine_config = engine_config.with_binary(binary);
    }

    let engine = Arc::new(OllamaEngine::new(engine_config.clone()));
    let coordinator = Coordinator::new(engine, CoordinatorConfig::from_env());

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| miette::miette!("Failed to start async runtime: {}", e))?;

    runtime.block_on(async {
        match cli.command {
            Commands::Check { model } => commands::check::run(&coordinator, &model).await,
            Commands::Pull { model } => commands::pull::run(&coordinator, &model).await,
            Commands::Chat {
                message,
                model,
                image,
                history,
            } => {
                commands::chat::run(
                    &coordinator,
                    message,
                    model.as_deref(),
                    image.as_deref(),
                    history.as_deref(),
                )
                .await
            }
            Commands::Models => commands::models::run(&coordinator).await,
            Commands::Info => commands::info::run(&engine_config, coordinator.config()),
        }
    })
}
