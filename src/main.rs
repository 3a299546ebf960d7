use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "triage")]
#[command(version, about = "Autonomous issue dispatch pipeline")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory containing triage.toml (defaults to the current directory)
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the dispatcher: webhook server, pollers, and queue processor
    Serve {
        /// Port override; defaults to the configured server port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Evaluate a canonical issue from a JSON file without dispatching
    Evaluate {
        /// Path to the issue JSON
        file: PathBuf,
    },
    /// Inspect the append-only audit log
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },
}

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Print every audit event, oldest first
    List,
    /// Print the events for one job
    Show { job_id: uuid::Uuid },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "triage=debug,info" } else { "triage=info,warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let config_dir = match cli.config_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Serve { port } => cmd::cmd_serve(&config_dir, *port).await?,
        Commands::Evaluate { file } => cmd::cmd_evaluate(&config_dir, file)?,
        Commands::Audit { command } => cmd::cmd_audit(&config_dir, command)?,
    }

    Ok(())
}
