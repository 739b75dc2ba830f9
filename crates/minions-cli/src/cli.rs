use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "minions")]
#[command(about = "Semantic index and search for a local codebase", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, default_value = ".", help = "Workspace root directory")]
    pub workspace: PathBuf,

    #[arg(short, long, global = true, help = "Config file (default: <workspace>/minions.toml)")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    #[command(about = "Index every eligible file in the workspace")]
    Index,

    #[command(about = "Search the index for chunks similar to a query")]
    Search {
        #[arg(help = "Natural-language or code query")]
        query: String,

        #[arg(short = 'k', long, default_value_t = 5, help = "Number of results")]
        top_k: usize,

        #[arg(long, help = "Print results as JSON")]
        json: bool,
    },

    #[command(about = "Re-index a single file, or drop it if deleted")]
    Update {
        #[arg(help = "File path, relative to the workspace or absolute")]
        path: PathBuf,
    },

    #[command(about = "Remove a file from the index")]
    Remove {
        #[arg(help = "File path, relative to the workspace or absolute")]
        path: PathBuf,
    },

    #[command(about = "Delete every index record")]
    Clear,

    #[command(about = "Show index statistics")]
    Stats {
        #[arg(long, help = "Print statistics as JSON")]
        json: bool,
    },

    #[command(about = "List indexed files")]
    Files,

    #[command(about = "Print the current content of a workspace file")]
    Show {
        #[arg(help = "Workspace-relative file path")]
        path: String,
    },

    #[command(about = "Print the effective configuration")]
    Config,
}
