mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "lakeload",
    version,
    about = "Incremental object-storage to warehouse loader"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline once
    Run {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
        /// Extract, clean, and print the synthesized schema; skip the
        /// warehouse and leave the checkpoint untouched
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate pipeline configuration and connectivity
    Check {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run { pipeline, dry_run } => commands::run::execute(&pipeline, dry_run).await,
        Commands::Check { pipeline } => commands::check::execute(&pipeline).await,
    }
}
