use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "habit-league-cli", version, about = "Habit League CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Current balance
    User {
        #[command(subcommand)]
        action: commands::user::UserAction,
    },
    /// Apply a raw point change
    Points {
        #[command(subcommand)]
        action: commands::points::PointsAction,
    },
    /// Habit management
    Habit {
        #[command(subcommand)]
        action: commands::habit::HabitAction,
    },
    /// League tier and progress
    League {
        #[command(subcommand)]
        action: commands::league::LeagueAction,
    },
    /// Point history
    History {
        #[command(subcommand)]
        action: commands::history::HistoryAction,
    },
    /// League upkeep
    Reconcile {
        #[command(subcommand)]
        action: commands::reconcile::ReconcileAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("HABIT_LEAGUE_LOG")
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_logging();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::User { action } => commands::user::run(action),
        Commands::Points { action } => commands::points::run(action),
        Commands::Habit { action } => commands::habit::run(action),
        Commands::League { action } => commands::league::run(action),
        Commands::History { action } => commands::history::run(action),
        Commands::Reconcile { action } => commands::reconcile::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
