//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--dir <path>`: Open exactly this repository instead of searching
//!   upward from the current directory
//! - `--debug`: Enable debug logging
//! - `--json`: Machine-readable output

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// grgit - Porcelain git operations for build scripts
#[derive(Parser, Debug)]
#[command(name = "grgit")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Repository directory (default: search upward from the current directory)
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show working tree status
    Status,

    /// Show commit history
    Log {
        /// Revisions to walk (default: HEAD); prefix with ^ to exclude
        revisions: Vec<String>,

        /// Limit the number of commits shown
        #[arg(short = 'n', long)]
        max_count: Option<usize>,

        /// Skip this many commits first
        #[arg(long, default_value_t = 0)]
        skip: usize,
    },

    /// Show what HEAD points at
    Head,

    /// List branches
    Branch {
        /// List local and remote-tracking branches
        #[arg(short, long, conflicts_with = "remotes")]
        all: bool,

        /// List remote-tracking branches only
        #[arg(short, long)]
        remotes: bool,
    },

    /// List, create, or delete tags
    Tag {
        #[command(subcommand)]
        action: Option<TagAction>,
    },

    /// Describe a commit using the nearest tag
    Describe {
        /// Revision to describe (default: HEAD)
        revision: Option<String>,

        /// Consider lightweight tags too
        #[arg(long)]
        tags: bool,

        /// Always show the long format
        #[arg(long)]
        long: bool,

        /// Fall back to the abbreviated commit id
        #[arg(long)]
        always: bool,
    },

    /// Download refs and objects from a remote
    Fetch {
        /// Remote name (default: configured remote)
        #[arg(long)]
        remote: Option<String>,

        /// Remove remote-tracking refs that no longer exist
        #[arg(long)]
        prune: bool,

        /// Fetch all tags
        #[arg(long)]
        tags: bool,
    },

    /// Update remote refs
    Push {
        /// Branches, tags, or refspecs (default: current branch)
        refs: Vec<String>,

        /// Remote name (default: configured remote)
        #[arg(long)]
        remote: Option<String>,

        /// Allow non-fast-forward updates
        #[arg(short, long)]
        force: bool,

        /// Push all tags
        #[arg(long)]
        tags: bool,

        /// Push all local branches
        #[arg(long)]
        all: bool,
    },
}

/// Tag subcommands.
#[derive(Subcommand, Debug)]
pub enum TagAction {
    /// List tags (default)
    List,

    /// Create a tag
    Add {
        name: String,

        /// Tag message
        #[arg(short, long)]
        message: Option<String>,

        /// Revision to tag
        #[arg(long, default_value = "HEAD")]
        target: String,

        /// Create a lightweight tag instead of an annotated one
        #[arg(long, conflicts_with = "message")]
        lightweight: bool,

        /// Replace an existing tag
        #[arg(short, long)]
        force: bool,
    },

    /// Delete tags
    Delete {
        #[arg(required = true)]
        names: Vec<String>,
    },
}
