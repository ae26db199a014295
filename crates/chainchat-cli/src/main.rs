mod commands;
mod render;
mod repl;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chainchat_core::ChainChatConfig;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chainchat")]
#[command(about = "ChainChat - chain prompts through local Ollama models", long_about = None)]
struct Cli {
    /// Gateway base URL (overrides config and CHAINCHAT_SERVER)
    #[arg(long, global = true)]
    server: Option<String>,

    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List models installed on the server
    Models,

    /// Show the recommended model catalog
    Catalog {
        /// RAM tier (e.g. 8GB, 16GB, 32GB)
        #[arg(short, long)]
        ram: Option<String>,

        /// Use case (chat, code, reasoning, summarization)
        #[arg(short, long)]
        use_case: Option<String>,
    },

    /// Stream one response through a chain of models
    Ask {
        /// Prompt text
        prompt: String,

        /// Models to chain, in order
        #[arg(short, long = "model", required = true, num_args = 1..)]
        models: Vec<String>,

        /// Ask the models to show their reasoning
        #[arg(long)]
        reasoning: bool,
    },

    /// Download a model on the server
    Pull {
        /// Model name (e.g. llama3.2:3b)
        model: String,
    },

    /// Show gateway status
    Status,
}

fn load_config(cli: &Cli) -> Result<ChainChatConfig> {
    let mut config = match &cli.config {
        Some(path) => ChainChatConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ChainChatConfig::default(),
    };
    config.apply_env()?;
    apply_flags(&mut config, cli);
    Ok(config)
}

/// Command-line flags win over file and environment
fn apply_flags(config: &mut ChainChatConfig, cli: &Cli) {
    if let Some(server) = &cli.server {
        config.server.base_url = server.clone();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Some(Commands::Models) => commands::models(&config).await?,
        Some(Commands::Catalog { ram, use_case }) => {
            commands::catalog(&config, ram.as_deref(), use_case.as_deref())?
        }
        Some(Commands::Ask {
            prompt,
            models,
            reasoning,
        }) => commands::ask(&config, prompt, models, reasoning).await?,
        Some(Commands::Pull { model }) => commands::pull(&config, &model).await?,
        Some(Commands::Status) => commands::status(&config).await?,
        None => repl::run(&config).await?,
    }

    Ok(())
}
