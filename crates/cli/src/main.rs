//! Kotoba CLI — the main entry point.
//!
//! Commands:
//! - `onboard`  — Initialize config
//! - `chat`     — Interactive tutoring or single-message mode
//! - `sessions` — List stored sessions
//! - `doctor`   — Diagnose setup health

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "kotoba",
    about = "Kotoba — a conversational Japanese tutor",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration
    Onboard,

    /// Chat with the tutor
    Chat {
        /// Continue an existing session by id
        #[arg(short, long)]
        session: Option<String>,

        /// User id for memory and progress scoping
        #[arg(short, long, default_value = "local")]
        user: String,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// List stored sessions
    Sessions {
        /// User id to list sessions for
        #[arg(short, long, default_value = "local")]
        user: String,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Diagnose setup health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Chat {
            session,
            user,
            message,
        } => commands::chat::run(session, user, message).await?,
        Commands::Sessions { user, json } => commands::sessions::run(user, json).await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
