// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};

#[derive(Parser, Debug)]
#[command(
    name = "sam",
    about = "Distributed multi-agent runtime coordinating tasks over a pub/sub broker",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start this agent process: subscribes to its request/response
    /// topics and runs the turn algorithm, timeout sweeper, and
    /// discovery publisher until interrupted.
    Run {
        /// Path to the agent's YAML config file.
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
        /// Path to the tool manifest YAML (local + peer-delegation tools).
        #[arg(long, short = 't')]
        tools: Option<PathBuf>,
        /// Directory artifacts are saved under (default: ./artifacts).
        #[arg(long)]
        artifacts_dir: Option<PathBuf>,
    },

    /// Run a self-contained local demonstration: one or two agents share
    /// an in-memory broker in this process, a task is sent to the
    /// primary agent, and its status updates and terminal response are
    /// printed to stdout. Useful for smoke-testing the turn algorithm
    /// without any external broker or model endpoint.
    Demo {
        /// Path to the primary agent's YAML config file.
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
        /// Path to the tool manifest YAML.
        #[arg(long, short = 't')]
        tools: Option<PathBuf>,
        /// The prompt to send as the initial user message.
        #[arg(long, short = 'p', default_value = "hello")]
        prompt: String,
    },

    /// Generate shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print the effective agent configuration and exit.
    ShowConfig {
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "sam", &mut std::io::stdout());
}
