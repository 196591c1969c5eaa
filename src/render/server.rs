//! Render JSON-RPC 2.0 server: reads requests line by line, writes one
//! response line per request.
//!
//! Tracing output goes to stderr so it doesn't interfere with the protocol.

use std::io::{BufRead, Write};

use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use super::commands::{self, CallError, CallResult};
use super::types::*;
use crate::graph::GraphDiff;
use crate::project::Project;
use crate::session::DiagramSession;
use crate::storage::ManifestDiff;
use crate::view::ViewUpdate;

/// Answer to `sync`: what changed on disk and what the renderer must redraw.
#[derive(Debug, Serialize)]
pub struct SyncResult {
    pub changes: ManifestDiff,
    pub diff: GraphDiff,
    pub update: ViewUpdate,
}

/// A project the server can re-read and save through.
struct Attached {
    project: Project,
    runtime: Handle,
}

pub struct Server {
    session: DiagramSession,
    attached: Option<Attached>,
}

impl Server {
    pub fn new(session: DiagramSession) -> Self {
        Self {
            session,
            attached: None,
        }
    }

    /// Enable `sync` and `save`. The server must then run off the runtime's
    /// worker threads, since it blocks on project calls.
    pub fn with_project(mut self, project: Project, runtime: Handle) -> Self {
        self.attached = Some(Attached { project, runtime });
        self
    }

    pub fn session(&self) -> &DiagramSession {
        &self.session
    }

    pub fn into_session(self) -> DiagramSession {
        self.session
    }

    /// Serve until `input` closes.
    pub fn run(&mut self, input: impl BufRead, mut output: impl Write) {
        info!(session = %self.session.id(), "render server starting");

        for line in input.lines() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    error!(error = %e, "failed to read input");
                    break;
                }
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            debug!(request = %trimmed, "received request");

            let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "invalid JSON-RPC request");
                    let response = JsonRpcResponse::error(None, PARSE_ERROR, format!("Parse error: {}", e));
                    if !write_response(&mut output, &response) {
                        break;
                    }
                    continue;
                }
            };

            if let Some(response) = self.handle_request(&request) {
                if !write_response(&mut output, &response) {
                    break;
                }
            }
        }

        info!(session = %self.session.id(), "render server shutting down");
    }

    /// Handle a single request. `None` for notifications.
    pub fn handle_request(&mut self, request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id.clone();

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                format!("Unsupported jsonrpc version: {}", request.jsonrpc),
            ));
        }

        let result = match request.method.as_str() {
            "initialize" => {
                info!("renderer initializing");
                self.initialize()
            }
            "initialized" => {
                info!("renderer initialized");
                return None;
            }
            "ping" => Ok(serde_json::json!({})),
            "sync" => self.sync(),
            "save" => self.save(),
            method => match commands::call(&mut self.session, method, &request.params) {
                Some(result) => result,
                None => {
                    warn!(method = %method, "unknown method");
                    Err(CallError::new(METHOD_NOT_FOUND, format!("Method not found: {}", method)))
                }
            },
        };

        // requests without an id are notifications
        id.as_ref()?;
        Some(match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => JsonRpcResponse::error_with_data(id, e.code, e.message, e.data),
        })
    }

    fn initialize(&self) -> CallResult {
        let mut methods = vec!["initialize", "ping"];
        methods.extend_from_slice(commands::METHODS);
        if self.attached.is_some() {
            methods.extend(["sync", "save"]);
        }
        commands::to_value(&InitializeResult {
            server_info: ServerInfo {
                name: "codescope".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            session_id: self.session.id().to_string(),
            revision: self.session.revision(),
            methods,
        })
    }

    fn sync(&mut self) -> CallResult {
        let attached = self.attached()?;
        let report = attached
            .runtime
            .block_on(attached.project.sync())
            .map_err(|e| CallError::new(INTERNAL_ERROR, e.to_string()))?;
        let update = self.session.poll();
        commands::to_value(&SyncResult {
            changes: report.changes,
            diff: report.diff,
            update,
        })
    }

    fn save(&mut self) -> CallResult {
        let attached = self.attached()?;
        let layout = self.session.layout_state().clone();
        let path = attached
            .runtime
            .block_on(attached.project.save(Some(layout)))
            .map_err(|e| CallError::new(INTERNAL_ERROR, e.to_string()))?;
        Ok(serde_json::json!({ "path": path.display().to_string() }))
    }

    fn attached(&self) -> Result<&Attached, CallError> {
        self.attached
            .as_ref()
            .ok_or_else(|| CallError::new(METHOD_NOT_FOUND, "Method not available without a project"))
    }
}

/// Write one response line. `false` once the output is gone.
fn write_response(out: &mut impl Write, response: &JsonRpcResponse) -> bool {
    let json = match serde_json::to_string(response) {
        Ok(j) => j,
        Err(e) => {
            error!(error = %e, "failed to serialize response");
            return true;
        }
    };
    debug!(response_len = json.len(), "sending response");
    if let Err(e) = writeln!(out, "{}", json).and_then(|_| out.flush()) {
        error!(error = %e, "failed to write response");
        return false;
    }
    true
}
