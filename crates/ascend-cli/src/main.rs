use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "ascend-cli", version, about = "Ascend focus engine CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the focus engine, reading line commands from stdin
    Serve(commands::serve::ServeArgs),
    /// Show a member's progression
    Stats {
        /// User id
        user: String,
        /// Display name used if the user has no record yet
        #[arg(long)]
        name: Option<String>,
    },
    /// XP leaderboard
    Leaderboard {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Periodic reports
    Report {
        #[command(subcommand)]
        action: commands::report::ReportAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Discord bot token management
    Auth {
        #[command(subcommand)]
        action: commands::auth::AuthAction,
    },
}

#[tokio::main]
async fn main() {
    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ascend=info")))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Serve(args) => commands::serve::run(args).await,
        Commands::Stats { user, name } => commands::stats::user(&user, name.as_deref()).await,
        Commands::Leaderboard { limit } => commands::stats::leaderboard(limit).await,
        Commands::Report { action } => commands::report::run(action).await,
        Commands::Config { action } => commands::config::run(action),
        Commands::Auth { action } => commands::auth::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
