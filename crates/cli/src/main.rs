//! Anemone CLI, the main entry point.
//!
//! Commands:
//! - `onboard`  Create `~/.anemone` and a default config
//! - `chat`     Talk to Anemone in the terminal
//! - `gateway`  Serve the chat page, WebSocket and HTTP API
//! - `seed`     Load the demo memories into the configured store
//! - `memory`   Inspect or clear the memory store
//! - `doctor`   Check config, backend and memory store

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "anemone",
    about = "Anemone: a conversational agent with its own memories",
    version
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
    /// Initialize configuration and memory directory
    Onboard,

    /// Chat with Anemone
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Start the HTTP and WebSocket gateway
    Gateway {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Load the demo memories into the memory store
    Seed,

    /// Inspect or clear the memory store
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// Diagnose configuration, backend and memory store
    Doctor,
}

#[derive(Subcommand)]
enum MemoryAction {
    /// Show the backend and how many memories it holds
    Stats,
    /// Show the best memory for a query
    Search { query: String },
    /// Delete every memory
    Clear {
        /// Skip the confirmation
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Chat { message } => commands::chat::run(message).await?,
        Commands::Gateway { port } => commands::gateway::run(port).await?,
        Commands::Seed => commands::seed::run().await?,
        Commands::Memory { action } => match action {
            MemoryAction::Stats => commands::memory::stats().await?,
            MemoryAction::Search { query } => commands::memory::search(&query).await?,
            MemoryAction::Clear { yes } => commands::memory::clear(yes).await?,
        },
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
