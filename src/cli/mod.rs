//! CLI for codescope.
//!
//! Commands:
//! - System: build, stats, changes
//! - Query: search, deps
//! - Diagram: view, export

mod run;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::export::ExportFormat;

pub use run::run;

#[derive(Parser)]
#[command(name = "codescope")]
#[command(about = "Structural code graphs and diagram layouts")]
#[command(override_help = HELP_TEXT)]
pub struct Cli {
    /// Project root directory (default: current directory)
    #[arg(short, long, default_value = ".")]
    pub root: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

const HELP_TEXT: &str = "
codescope: structural code graphs and diagram layouts

Start here:
  build                 Parse the tree and cache the graph
  view                  Print the laid-out diagram

Query:
  search <query>        Find symbols
  deps <symbol>         What a symbol uses and what uses it

Diagram:
  view --expand <id>    Open containers before printing
  export --format d2    Write the diagram as D2 or JSON

Other:
  stats                 Graph statistics
  changes               What changed since the last build

Options:
  -r, --root <PATH>     Project root (default: .)
";

#[derive(Subcommand)]
pub enum Commands {
    // ─── System ───────────────────────────────────────────────────
    /// Build the graph from scratch and cache it
    Build,

    /// Show graph statistics
    Stats,

    /// List files added, modified or deleted since the cached build
    Changes,

    // ─── Query ────────────────────────────────────────────────────
    /// Search for symbols by name
    Search {
        /// Symbol name to search for
        query: String,

        /// Max results
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show what a symbol depends on and what depends on it
    Deps {
        /// Symbol identity (`path#qualified`) or name
        symbol: String,
    },

    // ─── Diagram ──────────────────────────────────────────────────
    /// Print the laid-out diagram
    View {
        #[command(flatten)]
        diagram: DiagramArgs,
    },

    /// Export the diagram
    Export {
        #[command(flatten)]
        diagram: DiagramArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value = "d2")]
        format: ExportFormat,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Shapes the diagram before it is printed or exported.
#[derive(Args, Debug, Clone, Default)]
pub struct DiagramArgs {
    /// Expand a container (identity or name), repeatable
    #[arg(short, long)]
    pub expand: Vec<String>,

    /// Reveal a symbol by opening its containers, repeatable
    #[arg(long)]
    pub reveal: Vec<String>,

    /// Show only this symbol and what it contains
    #[arg(long)]
    pub scope: Option<String>,

    /// Show only symbols in this language, repeatable
    #[arg(long)]
    pub language: Vec<String>,

    /// Reveal symbols whose name contains this text
    #[arg(short, long)]
    pub text: Option<String>,

    /// Persist the resulting layout into the cache
    #[arg(long)]
    pub save: bool,
}
