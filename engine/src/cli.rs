//! CLI interface for Waymark
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines the operator commands and the global flags.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Waymark roadmap negotiation
///
/// Edit a stored roadmap by talking to a language model. Each call to
/// `negotiate` runs one turn: the model either asks a question or commits
/// a new version of the roadmap.
#[derive(Parser, Debug)]
#[command(name = "waymark")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one negotiation turn against a roadmap
    Negotiate {
        /// Roadmap to edit
        #[arg(long, value_name = "ID")]
        roadmap: i64,

        /// Conversation to continue (default: roadmap:<ID>)
        #[arg(long, value_name = "CID")]
        conversation: Option<String>,

        /// What the user said
        utterance: String,
    },

    /// Show the stored transcript of a conversation
    History {
        /// Conversation id
        #[arg(long, value_name = "CID")]
        conversation: String,

        /// Number of entries to show (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show a roadmap with its steps
    Show {
        /// Roadmap id
        roadmap_id: i64,
    },
}
