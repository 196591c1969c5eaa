//! codescope CLI: build, query and lay out a project's code graph.
//!
//! Usage:
//!   codescope build                  # Parse the tree, cache the graph
//!   codescope stats                  # Graph statistics
//!   codescope search <query>         # Find symbols
//!   codescope deps <symbol>          # Dependencies and dependents
//!   codescope view --expand <id>     # Print the laid-out diagram
//!   codescope export --format d2     # Export the diagram
//!   codescope changes                # Files changed since the last build

use anyhow::Result;
use clap::Parser;
use codescope::cli::{run, Cli};

#[tokio::main]
async fn main() {
    // Logs go to stderr so command output stays pipeable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = execute(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run(cli, &mut out).await?;
    Ok(())
}
