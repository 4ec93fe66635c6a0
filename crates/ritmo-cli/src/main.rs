mod inspect;
mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use ritmo_config::{ConfigError, RitmoConfig};

#[derive(Parser)]
#[command(name = "ritmo", about = "Recurring task scheduler and background-service daemon")]
struct Cli {
    /// Config file path (defaults to ~/.ritmo/config.json5)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler and background services
    Run,
    /// Write a starter config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// List configured tasks and their next run times
    Tasks,
    /// Show recent run history from the ledger
    History {
        /// Only show runs of this task
        #[arg(long)]
        task: Option<String>,

        /// Maximum number of records
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Execute one configured task immediately
    RunTask {
        /// Task id from the config file
        id: String,
    },
    /// Check configuration and credential availability
    Check,
}

/// Load config from the override path or the default location.
fn load_config(path: &Option<PathBuf>) -> Result<RitmoConfig, ConfigError> {
    match path {
        Some(path) => {
            let _ = dotenvy::dotenv();
            ritmo_config::load_config_from(path)
        }
        None => ritmo_config::load_config(),
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run::run_daemon(&cli.config))?;
        }
        Commands::Init { force } => inspect::write_initial_config(&cli.config, force)?,
        Commands::Tasks => inspect::list_tasks(&cli.config)?,
        Commands::History { task, limit } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(inspect::show_history(task, limit))?;
        }
        Commands::RunTask { id } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run::run_single_task(&cli.config, &id))?;
        }
        Commands::Check => inspect::check(&cli.config)?,
    }

    Ok(())
}
