//! Render protocol types: JSON-RPC 2.0 envelopes and method parameters.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::export::ExportFormat;
use crate::graph::types::SymbolId;
use crate::view::ViewFilter;

// ─── JSON-RPC 2.0 Base Types ────────────────────────────────────

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
/// The symbol named by the request is gone from the current snapshot.
pub const STALE_REFERENCE: i64 = -32001;
/// The request was issued against an older revision.
pub const STALE_REVISION: i64 = -32002;

/// An incoming JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// An outgoing JSON-RPC response.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// A JSON-RPC error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, code: i64, message: String) -> Self {
        Self::error_with_data(id, code, message, None)
    }

    pub fn error_with_data(id: Option<Value>, code: i64, message: String, data: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError { code, message, data }),
        }
    }
}

// ─── Handshake ──────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub server_info: ServerInfo,
    pub session_id: String,
    pub revision: u64,
    pub methods: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

// ─── Method Params ──────────────────────────────────────────────

/// Params for `expand`, `collapse` and `reveal`.
#[derive(Debug, Deserialize)]
pub struct NodeParams {
    pub id: SymbolId,
    /// Revision the renderer's view was at when the request was issued.
    #[serde(default)]
    pub revision: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: String,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
    #[serde(default)]
    pub revision: Option<u64>,
}

fn default_search_limit() -> usize {
    20
}

#[derive(Debug, Default, Deserialize)]
pub struct SetFilterParams {
    #[serde(default)]
    pub filter: ViewFilter,
    #[serde(default)]
    pub revision: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ExportParams {
    #[serde(default = "default_export_format")]
    pub format: ExportFormatParam,
}

fn default_export_format() -> ExportFormatParam {
    ExportFormatParam::Json
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormatParam {
    D2,
    Json,
}

impl From<ExportFormatParam> for ExportFormat {
    fn from(format: ExportFormatParam) -> Self {
        match format {
            ExportFormatParam::D2 => ExportFormat::D2,
            ExportFormatParam::Json => ExportFormat::Json,
        }
    }
}

// ─── Method Results ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SearchResult {
    pub revision: u64,
    pub ids: Vec<SymbolId>,
}

#[derive(Debug, Serialize)]
pub struct ExportResult {
    pub revision: u64,
    pub text: String,
}
