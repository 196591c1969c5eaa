//! Crate-wide error type.
//!
//! Layer-specific failures ([`ParseError`](crate::parser::ParseError),
//! [`LayoutError`](crate::layout::LayoutError),
//! [`QueryError`](crate::session::QueryError),
//! [`StorageError`](crate::storage::StorageError)) live next to the code that
//! raises them and convert into [`CodescopeError`] at the crate boundary.

use std::path::PathBuf;

use thiserror::Error;

use crate::layout::LayoutError;
use crate::session::QueryError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum CodescopeError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("source file too large: {path} ({size} bytes, limit {limit})")]
    FileTooLarge {
        path: PathBuf,
        size: u64,
        limit: u64,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("query error: {0}")]
    Query(#[from] QueryError),

    #[error("layout error: {0}")]
    Layout(#[from] LayoutError),

    #[error("project applier has shut down")]
    ProjectClosed,

    #[error("ingestion worker failed: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, CodescopeError>;
