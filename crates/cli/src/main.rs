//! Proctor CLI: the main entry point.
//!
//! Commands:
//! - `agent`  : Answer one message with the ReAct agent
//! - `test`   : Run a goal-driven test against the configured target
//! - `tools`  : List every tool the configured sources expose
//! - `config` : Print a starter config file

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "proctor",
    about = "Proctor: tool-using agents and goal-driven tests",
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
    /// Answer a single message with the ReAct agent
    Agent {
        /// The message or task
        #[arg(short, long)]
        message: String,
    },

    /// Run a goal-driven test and print the result as JSON
    Test {
        /// Outcome the system under test should reach
        #[arg(short, long)]
        goal: String,

        /// How to go about testing (persona, constraints)
        #[arg(short, long)]
        instructions: Option<String>,

        /// Background the tester should assume
        #[arg(short, long)]
        scenario: Option<String>,
    },

    /// List tools from all configured sources
    Tools,

    /// Print the default configuration
    Config {
        /// Print the config file path instead
        #[arg(long)]
        path: bool,
    },
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
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Agent { message } => commands::agent::run(&message, cli.verbose).await?,
        Commands::Test {
            goal,
            instructions,
            scenario,
        } => commands::test::run(goal, instructions, scenario, cli.verbose).await?,
        Commands::Tools => commands::tools::run().await?,
        Commands::Config { path } => commands::config_cmd::run(path)?,
    }

    Ok(())
}
