//! CLI commands and argument parsing

use crate::types::LogLevel;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Relay paginated VOTO API listings to WebSocket consumers
#[derive(Parser, Debug)]
#[command(name = "voto-relay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (YAML, or JSON with a .json extension)
    #[arg(short = 'C', long, global = true, conflicts_with = "legacy_config_dir")]
    pub config: Option<PathBuf>,

    /// Directory holding legacy global.json and keys.json
    #[arg(long, global = true)]
    pub legacy_config_dir: Option<PathBuf>,

    /// Upstream API base URL
    #[arg(long, global = true, env = "VOTO_API_URL")]
    pub api_url: Option<String>,

    /// Upstream API key
    #[arg(long, global = true, env = "VOTO_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    pub log_level: Option<LogLevel>,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the WebSocket relay
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Send stream-end / stream-error frames after each session
        #[arg(long)]
        announce_completion: bool,
    },

    /// Walk every page of an endpoint and print one JSON line per page
    Fetch {
        /// Upstream endpoint, e.g. `trees`
        endpoint: String,

        /// Records per page
        #[arg(long)]
        chunk_size: Option<u32>,
    },

    /// Connect to a relay, send one request and print the records received
    Watch {
        /// Relay WebSocket URL
        #[arg(long, default_value = "ws://127.0.0.1:8780/ws")]
        url: String,

        /// Request type to send
        #[arg(long, default_value = crate::config::DEFAULT_REQUEST_TYPE)]
        request_type: String,

        /// Seconds to wait for the next frame before giving up
        #[arg(long, default_value = "10")]
        idle_timeout: u64,
    },

    /// Print the effective configuration with the API key masked
    Config,
}
