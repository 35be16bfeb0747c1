use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "regflow")]
#[command(about = "regflow - session-chained registration flows with mailbox code retrieval", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run registration flows for a batch of identities
    Run(commands::run::RunArgs),
    /// Write a starter configuration file
    InitConfig {
        /// Configuration file (defaults to the platform config directory)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Inspect relay list files
    Relays {
        #[command(subcommand)]
        action: RelaysAction,
    },
}

#[derive(Subcommand)]
enum RelaysAction {
    /// Parse a relay list and report what would be used
    Check {
        file: PathBuf,
        /// Scheme for entries that do not name one
        #[arg(long, default_value = "http")]
        scheme: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => commands::run::run(args).await?,
        Commands::InitConfig { config, force } => commands::init_config::run(config, force)?,
        Commands::Relays { action } => match action {
            RelaysAction::Check { file, scheme } => commands::relays::check(&file, &scheme)?,
        },
    }

    Ok(())
}
