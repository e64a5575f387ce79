//! CLI module for crew
//!
//! Provides command-line interface parsing for the crew-server binary.
//! Uses clap for argument parsing and owo-colors for colored terminal output.

pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// crew - multi-agent research orchestrator
#[derive(Parser, Debug)]
#[command(
    name = "crew-server",
    author = "Dirmacs <build@dirmacs.com>",
    version,
    about = "crew - multi-agent research orchestrator",
    long_about = "Plans a research topic, fans it out to who/what/when/where/how/why workers\n\
                  with tool-calling loops, merges their findings and writes a reviewed report.\n\n\
                  Run without arguments to start the server.",
    after_help = "EXAMPLES:\n    \
                  crew-server                                # Start the server (requires crew.toml)\n    \
                  crew-server --config my.toml serve         # Use a custom config file\n    \
                  crew-server run \"Quantum Machine Learning\" # One research run in the terminal\n    \
                  crew-server check                          # Validate crew.toml"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "crew.toml", global = true, env = "CREW_CONFIG")]
    pub config: PathBuf,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Run one research pipeline and print the report
    Run {
        /// Topic to research
        topic: String,

        /// Pre-seeded plan; skips the Plan stage
        #[arg(long)]
        plan: Option<String>,

        /// Print the full response as JSON instead of the report text
        #[arg(long)]
        json: bool,
    },

    /// Validate the configuration file and show warnings
    Check,

    /// List the workers the Research stage will launch
    Workers,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The subcommand to run, `serve` when none was given.
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve)
    }
}
