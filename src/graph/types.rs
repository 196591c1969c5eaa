//! Core types for the codescope graph.
//!
//! Symbols, references and per-unit records, plus the [`FileExtraction`]
//! produced for one source unit before it is merged into the graph.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::parser::{Span, SupportedLanguage, SyntaxKind};

/// Normalized unit path used in identities: forward slashes, no leading `./`.
pub fn unit_key(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/");
    s.strip_prefix("./").map(str::to_string).unwrap_or(s)
}

/// SHA-256 of the source text, lowercase hex.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ─── Identities ─────────────────────────────────────────────────

/// Stable symbol identity, `<path>#<qualified name>`. Never positional.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolId(String);

impl SymbolId {
    pub fn new(path: &str, qualified_name: &str) -> Self {
        Self(format!("{}#{}", path, qualified_name))
    }

    /// Parse an identity string. Returns `None` without a `#` separator.
    pub fn parse(s: &str) -> Option<Self> {
        let (path, qualified) = s.rsplit_once('#')?;
        (!path.is_empty() && !qualified.is_empty()).then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn path(&self) -> &str {
        self.0.rsplit_once('#').map(|(p, _)| p).unwrap_or(&self.0)
    }

    pub fn qualified_name(&self) -> &str {
        self.0.rsplit_once('#').map(|(_, q)| q).unwrap_or("")
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference identity: source, kind, literal name and the ordinal among
/// identical uses inside the same source symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceId(String);

impl ReferenceId {
    pub fn new(source: &SymbolId, kind: ReferenceKind, literal: &str, ordinal: usize) -> Self {
        Self(format!("{}->{}:{}@{}", source, kind, literal, ordinal))
    }

    pub fn parse(s: &str) -> Option<Self> {
        s.contains("->").then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── Symbols ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Module,
    Type,
    Function,
    Field,
}

impl SymbolKind {
    pub fn from_syntax(kind: SyntaxKind) -> Option<Self> {
        match kind {
            SyntaxKind::Module => Some(SymbolKind::Module),
            SyntaxKind::Type => Some(SymbolKind::Type),
            SyntaxKind::Function => Some(SymbolKind::Function),
            SyntaxKind::Field => Some(SymbolKind::Field),
            _ => None,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "module" => Some(SymbolKind::Module),
            "type" => Some(SymbolKind::Type),
            "function" => Some(SymbolKind::Function),
            "field" => Some(SymbolKind::Field),
            _ => None,
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolKind::Module => write!(f, "module"),
            SymbolKind::Type => write!(f, "type"),
            SymbolKind::Function => write!(f, "function"),
            SymbolKind::Field => write!(f, "field"),
        }
    }
}

/// A named declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    /// Containment path from the unit's module, joined by `::`.
    pub qualified_name: String,
    pub kind: SymbolKind,
    /// Finer-grained kind: `struct`, `class`, `trait`, `method`, ...
    pub type_hint: Option<String>,
    pub path: String,
    pub language: String,
    pub span: Span,
    /// `None` only for a unit's root module.
    pub container: Option<SymbolId>,
    /// Declared more than once in the same container.
    pub overloaded: bool,
}

// ─── References ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Call,
    Inherits,
    Imports,
    Instantiates,
    Uses,
}

impl ReferenceKind {
    pub fn from_syntax(kind: SyntaxKind) -> Option<Self> {
        match kind {
            SyntaxKind::Call => Some(ReferenceKind::Call),
            SyntaxKind::Inherit => Some(ReferenceKind::Inherits),
            SyntaxKind::Instantiate => Some(ReferenceKind::Instantiates),
            SyntaxKind::Identifier => Some(ReferenceKind::Uses),
            _ => None,
        }
    }

    /// Symbol kinds a reference of this kind may target.
    pub fn accepts(&self, target: SymbolKind) -> bool {
        match self {
            ReferenceKind::Call => matches!(target, SymbolKind::Function | SymbolKind::Type),
            ReferenceKind::Inherits | ReferenceKind::Instantiates | ReferenceKind::Uses => {
                target == SymbolKind::Type
            }
            ReferenceKind::Imports => true,
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::Call => write!(f, "call"),
            ReferenceKind::Inherits => write!(f, "inherits"),
            ReferenceKind::Imports => write!(f, "imports"),
            ReferenceKind::Instantiates => write!(f, "instantiates"),
            ReferenceKind::Uses => write!(f, "uses"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Resolved,
    Ambiguous,
    Unresolved,
}

impl Confidence {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "resolved" => Some(Confidence::Resolved),
            "ambiguous" => Some(Confidence::Ambiguous),
            "unresolved" => Some(Confidence::Unresolved),
            _ => None,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Resolved => write!(f, "resolved"),
            Confidence::Ambiguous => write!(f, "ambiguous"),
            Confidence::Unresolved => write!(f, "unresolved"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Resolved(SymbolId),
    /// Every equally-proximate candidate, plus the one the ambiguity policy
    /// prefers, if any.
    Ambiguous {
        candidates: Vec<SymbolId>,
        preferred: Option<SymbolId>,
    },
    Unresolved,
}

impl Resolution {
    pub fn confidence(&self) -> Confidence {
        match self {
            Resolution::Resolved(_) => Confidence::Resolved,
            Resolution::Ambiguous { .. } => Confidence::Ambiguous,
            Resolution::Unresolved => Confidence::Unresolved,
        }
    }

    /// The symbol an edge should point at.
    pub fn target(&self) -> Option<&SymbolId> {
        match self {
            Resolution::Resolved(id) => Some(id),
            Resolution::Ambiguous { preferred, .. } => preferred.as_ref(),
            Resolution::Unresolved => None,
        }
    }

    /// Every symbol this resolution mentions.
    pub fn candidates(&self) -> Vec<&SymbolId> {
        match self {
            Resolution::Resolved(id) => vec![id],
            Resolution::Ambiguous { candidates, .. } => candidates.iter().collect(),
            Resolution::Unresolved => Vec::new(),
        }
    }
}

/// A directed relation from a using symbol to a used one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub id: ReferenceId,
    pub source: SymbolId,
    pub kind: ReferenceKind,
    /// Literal name as written, last path segment only.
    pub name: String,
    /// Path segment preceding the name (`Config` in `Config::load`).
    pub qualifier: Option<String>,
    pub path: String,
    pub span: Span,
    /// Receiver only known at runtime.
    pub dynamic: bool,
    pub resolution: Resolution,
}

impl Reference {
    pub fn confidence(&self) -> Confidence {
        self.resolution.confidence()
    }

    pub fn target(&self) -> Option<&SymbolId> {
        self.resolution.target()
    }

    /// `qualifier.name`, or just `name`.
    pub fn literal(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{}.{}", q, self.name),
            None => self.name.clone(),
        }
    }
}

// ─── Units ──────────────────────────────────────────────────────

/// One source file handed to the engine for ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    pub path: PathBuf,
    /// Adapter registry tag.
    pub language: String,
    pub text: String,
    pub content_hash: String,
}

impl SourceUnit {
    pub fn new(path: impl Into<PathBuf>, language: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            path: path.into(),
            language: language.into(),
            content_hash: content_hash(&text),
            text,
        }
    }

    /// Build a unit, detecting the language from the file extension.
    pub fn detect(path: impl Into<PathBuf>, text: impl Into<String>) -> Option<Self> {
        let path = path.into();
        let language = SupportedLanguage::from_path(&path)?;
        Some(Self::new(path, language.tag(), text))
    }

    pub fn key(&self) -> String {
        unit_key(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Complete,
    /// Parsed with errors; symbols come from the well-formed regions only.
    Incomplete { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub path: String,
    pub language: String,
    pub content_hash: String,
    pub parsed_at: DateTime<Utc>,
    pub status: UnitStatus,
}

impl UnitRecord {
    pub fn is_complete(&self) -> bool {
        self.status == UnitStatus::Complete
    }
}

/// A tree node the extractor had to skip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionDiagnostic {
    pub path: String,
    pub span: Span,
    pub message: String,
    /// Enclosing symbol of the skipped region.
    pub symbol: Option<SymbolId>,
}

/// One imported name bound in a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportBinding {
    /// Dotted module path; empty for `import name`.
    pub module: String,
    /// Imported name or `*`.
    pub name: String,
    pub alias: Option<String>,
    pub span: Span,
}

impl ImportBinding {
    /// The name this binding introduces into the unit's scope.
    pub fn local_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn is_wildcard(&self) -> bool {
        self.name == "*"
    }

    /// Last segment of the module path.
    pub fn module_leaf(&self) -> Option<&str> {
        self.module.rsplit('.').next().filter(|s| !s.is_empty())
    }
}

/// Everything extracted from one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileExtraction {
    pub path: String,
    pub language: String,
    pub content_hash: String,
    pub parsed_at: DateTime<Utc>,
    pub symbols: Vec<Symbol>,
    pub references: Vec<Reference>,
    pub imports: Vec<ImportBinding>,
    pub diagnostics: Vec<ExtractionDiagnostic>,
    /// Set when the unit only parsed partially.
    pub parse_error: Option<String>,
}

impl FileExtraction {
    pub fn unit_record(&self) -> UnitRecord {
        UnitRecord {
            path: self.path.clone(),
            language: self.language.clone(),
            content_hash: self.content_hash.clone(),
            parsed_at: self.parsed_at,
            status: match &self.parse_error {
                Some(reason) => UnitStatus::Incomplete {
                    reason: reason.clone(),
                },
                None => UnitStatus::Complete,
            },
        }
    }

    /// The unit's root module symbol.
    pub fn module(&self) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.container.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_id_parts() {
        let id = SymbolId::new("src/a.rs", "a::Cache::get");
        assert_eq!(id.as_str(), "src/a.rs#a::Cache::get");
        assert_eq!(id.path(), "src/a.rs");
        assert_eq!(id.qualified_name(), "a::Cache::get");
        assert_eq!(SymbolId::parse("src/a.rs#a::Cache::get"), Some(id));
        assert_eq!(SymbolId::parse("no-separator"), None);
    }

    #[test]
    fn test_reference_id_independent_of_position() {
        let src = SymbolId::new("b.py", "b::main");
        let a = ReferenceId::new(&src, ReferenceKind::Call, "f", 0);
        let b = ReferenceId::new(&src, ReferenceKind::Call, "f", 0);
        assert_eq!(a, b);
        assert_ne!(a, ReferenceId::new(&src, ReferenceKind::Call, "f", 1));
        assert_eq!(a.as_str(), "b.py#b::main->call:f@0");
    }

    #[test]
    fn test_content_hash_is_sha256_hex() {
        let h = content_hash("hello");
        assert_eq!(h.len(), 64);
        assert_eq!(
            h,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_ne!(content_hash("hello "), h);
    }

    #[test]
    fn test_resolution_target() {
        let a = SymbolId::new("a.rs", "a::f");
        let b = SymbolId::new("b.rs", "b::f");
        assert_eq!(Resolution::Resolved(a.clone()).target(), Some(&a));
        let amb = Resolution::Ambiguous {
            candidates: vec![a.clone(), b.clone()],
            preferred: None,
        };
        assert_eq!(amb.target(), None);
        assert_eq!(amb.candidates().len(), 2);
        assert_eq!(amb.confidence(), Confidence::Ambiguous);
        assert_eq!(Resolution::Unresolved.target(), None);
    }

    #[test]
    fn test_unit_key() {
        assert_eq!(unit_key(Path::new("./src/main.rs")), "src/main.rs");
        assert_eq!(unit_key(Path::new("lib/a.py")), "lib/a.py");
    }
}
