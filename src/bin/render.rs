//! codescope render server: the diagram session for an external renderer.
//!
//! Runs a JSON-RPC 2.0 server over STDIO, one request per line.
//!
//! Usage:
//!   codescope-render [project_root]
//!
//! If no project root is given, uses the current working directory. The
//! session's layout is saved with the graph on clean shutdown.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};

use codescope::config::CodescopeConfig;
use codescope::project::{LoadOutcome, Project};
use codescope::render::Server;

#[tokio::main]
async fn main() -> Result<()> {
    // Tracing goes to stderr, stdout carries the protocol
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let project_root = match std::env::args().nth(1) {
        Some(arg) => PathBuf::from(arg),
        None => std::env::current_dir().context("no project root given and no current directory")?,
    };
    let project_root = project_root.canonicalize().unwrap_or(project_root);

    info!(root = %project_root.display(), "codescope render server starting");

    let config = CodescopeConfig::load_for_root(&project_root);
    let (project, outcome) = Project::load_or_build(&project_root, config)
        .await
        .context("failed to load project")?;
    let layout = match outcome {
        LoadOutcome::Restored { layout } => layout,
        LoadOutcome::Built { changes } => {
            info!(%changes, "graph built");
            None
        }
    };

    let session = project.resume_session(layout);
    let mut server = Server::new(session).with_project(project.clone(), tokio::runtime::Handle::current());

    info!("render server ready, waiting for JSON-RPC requests on stdin");

    // The loop blocks on stdin and on project calls, so it runs off the
    // runtime's worker threads
    let server = tokio::task::spawn_blocking(move || {
        let stdin = io::stdin();
        let stdout = io::stdout();
        server.run(stdin.lock(), stdout.lock());
        server
    })
    .await
    .context("render server thread failed")?;

    // Save graph and layout on clean shutdown
    let layout = server.into_session().layout_state().clone();
    match project.save(Some(layout)).await {
        Ok(path) => info!(path = %path.display(), "snapshot saved on shutdown"),
        Err(e) => warn!(error = %e, "failed to save snapshot on shutdown"),
    }
    Ok(())
}
