//! Render method implementations: map protocol calls to session queries.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::types::*;
use crate::export::export;
use crate::graph::types::SymbolId;
use crate::session::{DiagramSession, QueryError};
use crate::view::ViewUpdate;

/// A failed call, ready to become a JSON-RPC error object.
#[derive(Debug, Clone, PartialEq)]
pub struct CallError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl CallError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl From<QueryError> for CallError {
    fn from(err: QueryError) -> Self {
        let (code, data) = match &err {
            QueryError::StaleReference(id) => (STALE_REFERENCE, serde_json::json!({ "id": id })),
            QueryError::StaleRevision { requested, current } => (
                STALE_REVISION,
                serde_json::json!({ "requested": requested, "current": current }),
            ),
        };
        Self {
            code,
            message: err.to_string(),
            data: Some(data),
        }
    }
}

pub type CallResult = Result<Value, CallError>;

/// Names answered by [`call`], advertised on `initialize`.
pub const METHODS: &[&str] = &["view", "poll", "expand", "collapse", "reveal", "search", "setFilter", "export"];

/// Dispatch a session method. `None` when the method is not a session method.
pub fn call(session: &mut DiagramSession, method: &str, params: &Value) -> Option<CallResult> {
    let result = match method {
        "view" => to_value(&session.view()),
        "poll" => to_value(&session.poll()),
        "expand" => node_call(session, params, DiagramSession::expand),
        "collapse" => node_call(session, params, DiagramSession::collapse),
        "reveal" => node_call(session, params, DiagramSession::reveal),
        "search" => search(session, params),
        "setFilter" => set_filter(session, params),
        "export" => export_view(session, params),
        _ => return None,
    };
    Some(result)
}

fn node_call(
    session: &mut DiagramSession,
    params: &Value,
    op: fn(&mut DiagramSession, &SymbolId) -> Result<ViewUpdate, QueryError>,
) -> CallResult {
    let params: NodeParams = parse(params)?;
    check_revision(session, params.revision)?;
    debug!(id = %params.id, "node command");
    to_value(&op(session, &params.id)?)
}

fn search(session: &mut DiagramSession, params: &Value) -> CallResult {
    let params: SearchParams = parse(params)?;
    check_revision(session, params.revision)?;
    let ids = session.search(&params.query, params.limit)?;
    to_value(&SearchResult {
        revision: session.revision(),
        ids,
    })
}

fn set_filter(session: &mut DiagramSession, params: &Value) -> CallResult {
    let params: SetFilterParams = if params.is_null() {
        SetFilterParams::default()
    } else {
        parse(params)?
    };
    check_revision(session, params.revision)?;
    to_value(&session.set_filter(params.filter)?)
}

fn export_view(session: &mut DiagramSession, params: &Value) -> CallResult {
    let format = if params.is_null() {
        ExportFormatParam::Json
    } else {
        parse::<ExportParams>(params)?.format
    };
    let view = session.view();
    let text = export(&view, format.into()).map_err(|e| CallError::new(INTERNAL_ERROR, e.to_string()))?;
    to_value(&ExportResult {
        revision: view.revision,
        text,
    })
}

/// Only checked when the renderer sends one. The reference point is the
/// latest published snapshot, which the session moves to first.
fn check_revision(session: &mut DiagramSession, revision: Option<u64>) -> Result<(), CallError> {
    match revision {
        Some(requested) => Ok(session.ensure_revision(requested)?),
        None => Ok(()),
    }
}

fn parse<T: DeserializeOwned>(params: &Value) -> Result<T, CallError> {
    serde_json::from_value(params.clone()).map_err(|e| CallError::new(INVALID_PARAMS, format!("Invalid params: {}", e)))
}

pub(super) fn to_value<T: Serialize>(value: &T) -> CallResult {
    serde_json::to_value(value).map_err(|e| CallError::new(INTERNAL_ERROR, format!("Serialization failed: {}", e)))
}
