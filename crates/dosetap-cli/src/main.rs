use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "dosetap", version, about = "DoseTap CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the current dose window as JSON
    Status {
        /// Evaluate at this RFC 3339 instant instead of now
        #[arg(long)]
        at: Option<String>,
    },
    /// Record a dose action
    Dose {
        #[command(subcommand)]
        action: commands::dose::DoseCommand,
    },
    /// Quick-log a night event (bathroom, water, ...)
    Log {
        /// Event name
        event: String,
        /// Record at this RFC 3339 instant instead of now
        #[arg(long)]
        at: Option<String>,
    },
    /// Record the final wake-up
    Wake {
        #[arg(long)]
        at: Option<String>,
    },
    /// Complete the morning check-in
    Checkin {
        #[arg(long)]
        at: Option<String>,
    },
    /// Session key utilities
    Session {
        #[command(subcommand)]
        action: commands::session::SessionAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("DOSETAP_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Status { at } => commands::status::run(at.as_deref()),
        Commands::Dose { action } => commands::dose::run(action),
        Commands::Log { event, at } => commands::log::run(&event, at.as_deref()),
        Commands::Wake { at } => commands::dose::wake(at.as_deref()),
        Commands::Checkin { at } => commands::dose::check_in(at.as_deref()),
        Commands::Session { action } => commands::session::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
