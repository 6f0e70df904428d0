//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// KataBuilder - turn role documents into a coding kata repo
#[derive(Parser)]
#[command(
    name = "kb",
    about = "Generate coding kata repos from job descriptions and CVs",
    version = env!("CARGO_PKG_VERSION"),
    after_help = "Logs are written to: ~/.local/share/katabuilder/logs/kb.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a session from documents, extract the profile and plan it
    Init {
        /// Directories whose files are read as documents
        #[arg(value_name = "DOCS_DIR", required = true)]
        dirs: Vec<PathBuf>,

        /// Number of tasks in the plan (overrides generation.task-count)
        #[arg(short, long)]
        tasks: Option<usize>,
    },

    /// Regenerate the plan of a session
    Plan {
        /// Session id
        session: String,

        /// Guidance for the new plan
        #[arg(short, long)]
        feedback: Option<String>,
    },

    /// Build a planned session, streaming events as JSON lines, then package it
    Build {
        /// Session id
        session: String,
    },

    /// Show a session's stage, profile and plan
    Show {
        /// Session id
        session: String,
    },

    /// Print the path of a session's packaged archive
    Output {
        /// Session id
        session: String,
    },

    /// List stored sessions
    Sessions,
}
