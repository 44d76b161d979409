//! Command line argument parsing
//!
//! This module handles CLI argument parsing with subcommands:
//! - `status`: Probe every enabled provider once and print the results
//! - `watch`: Run the health monitor and print registry events until Ctrl-C
//! - `probe`: Force a health check of a single provider
//! - `classify`: Show how an error message would be classified and handled
//! - `show-config`: Show configuration discovery information

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, PartialEq)]
pub enum ExecutionMode {
    Status { json: bool },
    Watch,
    Probe(String),
    Classify(String),
    ShowConfig,
}

#[derive(Debug, Parser)]
#[command(name = "switchboard")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Health-checked routing and failover across LLM API providers")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Probe every enabled provider once and print their status
    Status {
        /// Print the status snapshot as JSON
        #[arg(long = "json")]
        json: bool,
    },
    /// Keep monitoring providers and print every registry event
    Watch,
    /// Force a health check of one provider
    Probe {
        /// Provider name
        provider: String,
    },
    /// Classify an error message and show the recovery strategy
    Classify {
        /// Error message (remaining words are joined with spaces)
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },
    /// Show configuration discovery information
    ShowConfig,
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }

    pub fn mode(&self) -> Result<ExecutionMode, String> {
        match &self.command {
            Some(Commands::Status { json }) => Ok(ExecutionMode::Status { json: *json }),
            Some(Commands::Watch) => Ok(ExecutionMode::Watch),
            Some(Commands::Probe { provider }) => {
                if provider.trim().is_empty() {
                    return Err("Provider name must not be empty".to_string());
                }
                Ok(ExecutionMode::Probe(provider.clone()))
            }
            Some(Commands::Classify { message }) => {
                let message = message.join(" ");
                if message.trim().is_empty() {
                    return Err("Error message must not be empty".to_string());
                }
                Ok(ExecutionMode::Classify(message))
            }
            Some(Commands::ShowConfig) => Ok(ExecutionMode::ShowConfig),
            None => Err(
                "No command specified. Use 'switchboard --help' to see available commands."
                    .to_string(),
            ),
        }
    }
}
