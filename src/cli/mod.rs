//! Command-line surface for the switchboard binary
//!
//! Uses clap for argument parsing and owo-colors for terminal output.

pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// switchboard - adapter-swapping agent orchestration engine
///
/// Routes queued requests to LoRA-adapted agents on a shared base model and
/// lets each agent call tools before it answers.
#[derive(Parser, Debug)]
#[command(
    name = "switchboard",
    version,
    about = "switchboard - adapter-swapping agent orchestration engine",
    after_help = "EXAMPLES:\n    \
                  switchboard serve                              # Run the dispatcher\n    \
                  switchboard submit \"What is 2+2?\"              # Queue a question and wait\n    \
                  switchboard submit \"hi\" --model openai:gpt-4o  # Answer with a provider\n    \
                  switchboard chat                               # Interactive session\n    \
                  switchboard agents list                        # Show configured agents"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(
        short,
        long,
        env = "SWITCHBOARD_CONFIG",
        default_value = "switchboard.toml",
        global = true
    )]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the dispatcher until interrupted
    Serve {
        /// Override the configured number of workers
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Queue a single request and print its result
    Submit {
        /// The question to ask
        query: String,

        /// Agents the router may choose from (defaults to every configured agent)
        #[arg(short, long, value_delimiter = ',')]
        agents: Vec<String>,

        /// `local_system` or `provider:model`
        #[arg(short, long, default_value = "local_system")]
        model: String,

        /// Block the query and response on dangerous content
        #[arg(long)]
        block_dangerous: bool,

        /// Keep queries containing PII on the local system
        #[arg(long)]
        pii_local: bool,

        /// Print the job id and return without waiting
        #[arg(long)]
        no_wait: bool,
    },

    /// Interactive session running jobs in-process
    Chat {
        /// `local_system` or `provider:model`
        #[arg(short, long, default_value = "local_system")]
        model: String,
    },

    /// Inspect configured agents
    #[command(subcommand)]
    Agents(AgentCommands),

    /// Show configuration information
    Config {
        /// Validate the configuration file
        #[arg(long)]
        validate: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum AgentCommands {
    /// List all configured agents
    List,

    /// Show details for a specific agent
    Show {
        /// Name of the agent
        name: String,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
