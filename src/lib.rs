//! # codescope
//!
//! Structural code graphs laid out for interactive diagrams.
//!
//! codescope parses source files into a normalized tree per language,
//! extracts declarations and references, resolves references across files,
//! and maintains a versioned graph of containment and dependency edges. A
//! [`DiagramSession`] turns a graph snapshot into a laid-out [`DiagramView`]
//! and keeps it current as the graph changes, moving only what a change
//! touches.
//!
//! ## Key Features
//!
//! - **Incremental**: replacing one file re-resolves only the names it affects
//! - **Stable identities**: symbols keep their id across body edits
//! - **Confidence-aware**: ambiguous and unresolved references stay visible
//! - **Multi-language**: Rust, Python, JavaScript, TypeScript, Go, Java, C#, Ruby
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use codescope::{CodescopeConfig, Project};
//!
//! # async fn demo() -> codescope::Result<()> {
//! let (project, _) = Project::load_or_build(".", CodescopeConfig::default()).await?;
//! let mut session = project.session();
//! let view = session.view();
//! println!("{} nodes, {} edges", view.nodes.len(), view.edges.len());
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod graph;
pub mod index;
pub mod layout;
pub mod parser;
pub mod project;
pub mod render;
pub mod session;
pub mod storage;
pub mod view;

// Re-exports for convenience
pub use config::CodescopeConfig;
pub use error::{CodescopeError, Result};

pub use graph::{
    CodeGraph, Confidence, GraphDiff, GraphStats, Reference, ReferenceKind, Resolution, SearchResult, SourceUnit,
    Symbol, SymbolId, SymbolKind,
};
pub use index::SymbolIndex;
pub use layout::{LayoutEngine, LayoutError};
pub use parser::{AdapterRegistry, ParseError, ParserAdapter, SupportedLanguage, SyntaxTree};
pub use project::Project;
pub use session::{DiagramSession, QueryError};
pub use view::{DiagramEdge, DiagramNode, DiagramView, ViewFilter, ViewUpdate};
