use std::path::PathBuf;

use clap::{Parser, Subcommand};
use relay_config::ReasoningLevel;

/// Relay LLM router
#[derive(Debug, Parser)]
#[command(name = "relay", about = "Route chat requests across local runtimes and cloud LLM providers")]
pub struct Args {
    /// Path to configuration file (providers come from the environment when omitted)
    #[arg(short, long, env = "RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter directive
    #[arg(long, default_value = "warn", env = "RELAY_LOG")]
    pub log_filter: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the availability of every configured provider
    Providers {
        /// Print statuses as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the models of one provider, or of every reachable provider
    Models {
        /// Provider name
        provider: Option<String>,
    },

    /// Probe one provider, bypassing the health cache
    Ping {
        /// Provider name
        provider: String,
    },

    /// Send one prompt and print the answer
    Chat(ChatArgs),
}

#[derive(Debug, clap::Args)]
pub struct ChatArgs {
    /// Model selector (`provider:model`, `provider`, or a bare model)
    pub model: String,

    /// User prompt
    pub prompt: String,

    /// System instruction
    #[arg(long)]
    pub system: Option<String>,

    /// Print tokens as they arrive
    #[arg(long)]
    pub stream: bool,

    /// Reasoning effort (off, low, medium, high)
    #[arg(long)]
    pub reasoning: Option<ReasoningLevel>,

    /// Fallback selectors replacing the configured chain
    #[arg(long, value_delimiter = ',')]
    pub fallback: Vec<String>,

    /// Print reasoning to stderr
    #[arg(long)]
    pub show_reasoning: bool,
}
