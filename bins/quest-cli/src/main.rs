mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "quest-cli")]
#[command(about = "Quest CLI - Run, check and grade Python submissions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a submission through the full pipeline and print the report
    Run {
        /// Exercise id (e.g., basic-1)
        #[arg(short, long)]
        exercise: String,

        /// Python source file
        #[arg(short, long)]
        file: PathBuf,

        /// Engine config file (defaults to config/engine.json if present)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Run the safety gate only
    Check {
        /// Python source file
        #[arg(short, long)]
        file: PathBuf,

        /// Engine config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// List exercises with a dedicated grading strategy
    Exercises {
        /// Engine config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Write the default engine configuration
    InitConfig {
        /// Output path
        #[arg(short, long, default_value = quest_engine::config::DEFAULT_CONFIG_PATH)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long, default_value = "false")]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Engine logs go to stderr so the JSON report on stdout stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { exercise, file, config } => {
            let success = commands::run_submission(&exercise, &file, config.as_deref()).await?;
            if !success {
                std::process::exit(1);
            }
        }
        Commands::Check { file, config } => {
            let safe = commands::check_file(&file, config.as_deref())?;
            if !safe {
                std::process::exit(1);
            }
        }
        Commands::Exercises { config } => {
            commands::list_exercises(config.as_deref())?;
        }
        Commands::InitConfig { path, force } => {
            commands::init_config(&path, force)?;
        }
    }

    Ok(())
}
