//! CLI module
//!
//! Command-line interface for the relay.
//!
//! # Commands
//!
//! - `serve` - Run the WebSocket relay
//! - `fetch` - Walk an endpoint's pages and print them
//! - `watch` - Consume a relay stream like a display client would
//! - `config` - Show the effective configuration

mod commands;
mod runner;

pub use commands::{Cli, Commands};
pub use runner::Runner;
