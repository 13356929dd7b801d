use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "pomolog", version, about = "Pomolog CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backlog management
    Backlog {
        #[command(subcommand)]
        action: commands::backlog::BacklogAction,
    },
    /// Workitem and pomodoro planning
    Workitem {
        #[command(subcommand)]
        action: commands::workitem::WorkitemAction,
    },
    /// Timer control
    Timer {
        #[command(subcommand)]
        action: commands::timer::TimerAction,
    },
    /// Print the current model
    Tree {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// List #tags used in workitem names
    Tags {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Strategy log inspection, import/export and compaction
    Log {
        #[command(subcommand)]
        action: commands::log::LogAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Print a shell completion script
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Logs go to stderr, filtered by `POMOLOG_LOG` (default `warn`).
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("POMOLOG_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Backlog { action } => commands::backlog::run(action),
        Commands::Workitem { action } => commands::workitem::run(action),
        Commands::Timer { action } => commands::timer::run(action),
        Commands::Tree { json } => commands::tree::run(json),
        Commands::Tags { json } => commands::tags::run(json),
        Commands::Log { action } => commands::log::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "pomolog", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
