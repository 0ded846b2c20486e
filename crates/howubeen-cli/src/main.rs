use std::path::PathBuf;

use clap::{Parser, Subcommand};
use howubeen_core::{logging, Config};

mod commands;

#[derive(Parser)]
#[command(name = "howubeen-cli", version, about = "HowUBeen CLI")]
struct Cli {
    /// Database file (defaults to the data directory)
    #[arg(long, global = true, env = "HOWUBEEN_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record and read check-ins
    Checkin {
        #[command(subcommand)]
        action: commands::checkin::CheckinAction,
    },
    /// User records (stand-in for the account service)
    User {
        #[command(subcommand)]
        action: commands::user::UserAction,
    },
    /// Emergency contacts
    Contact {
        #[command(subcommand)]
        action: commands::contact::ContactAction,
    },
    /// Inactivity sweeps and status
    Liveness {
        #[command(subcommand)]
        action: commands::liveness::LivenessAction,
    },
    /// Weekly summaries
    Summary {
        #[command(subcommand)]
        action: commands::summary::SummaryAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = Config::load_or_default();
    logging::init(&config.logging.level);

    let ctx = commands::Context::new(config, cli.db);
    let result = match cli.command {
        Commands::Checkin { action } => commands::checkin::run(&ctx, action).await,
        Commands::User { action } => commands::user::run(&ctx, action).await,
        Commands::Contact { action } => commands::contact::run(&ctx, action).await,
        Commands::Liveness { action } => commands::liveness::run(&ctx, action).await,
        Commands::Summary { action } => commands::summary::run(&ctx, action).await,
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
