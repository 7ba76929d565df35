use anyhow::Result;
use clap::{Parser, Subcommand};
use common::{init_structured_logging, LogFormat};
use std::path::PathBuf;

mod commands;
mod config;
mod echo;

use commands::{ConfigCommand, ReplayCommand};
use config::WorkerConfig;

#[derive(Parser)]
#[command(name = "dispatchd")]
#[command(about = "Worker-side task dispatch")]
#[command(version)]
struct Cli {
    /// Configuration file (.toml or .json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log one JSON object per line
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a JSON-lines stream of push requests through the receiver
    Replay(ReplayCommand),
    /// Inspect the configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = WorkerConfig::load(cli.config.as_deref())?;
    if cli.json_logs {
        config.logging.format = LogFormat::Json;
    }

    match cli.command {
        Commands::Replay(command) => {
            init_structured_logging(&config.logging)?;
            command.execute(&config).await
        }
        Commands::Config(command) => command.execute(&config),
    }
}
