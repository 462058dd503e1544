//! Command-line interface definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Watch a markdown tree and turn drafts into publishable articles
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory to watch (default: from config, else the current directory)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Config file name, relative to the root
    #[arg(short = 'C', long, default_value = "md2article.toml")]
    pub config: PathBuf,

    /// Print debug output
    #[arg(short, long)]
    pub verbose: bool,

    /// subcommands (default: watch)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Process existing articles, then watch for changes
    Watch,

    /// Process existing articles once and exit
    Scan,
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.unwrap_or(Commands::Watch)
    }
}
