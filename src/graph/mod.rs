//! Code graph module: the structural backbone of codescope.
//!
//! Provides the data model, the versioned graph store with its queries,
//! the builder that merges per-unit deltas, and graph diffs.

pub mod builder;
pub mod diff;
pub mod engine;
pub mod types;

pub use builder::{GraphBuilder, UnitDelta};
pub use diff::{GraphDiff, Snapshot, SymbolChange};
pub use engine::{CodeGraph, DependencyInfo, GraphStats, SearchResult, SymbolRecord, UnitEntry};
pub use types::{
    Confidence, ExtractionDiagnostic, FileExtraction, ImportBinding, Reference, ReferenceId,
    ReferenceKind, Resolution, SourceUnit, Symbol, SymbolId, SymbolKind, UnitRecord, UnitStatus,
};
