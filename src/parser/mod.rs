//! Parser adapters: raw source text to a normalized syntax tree.
//!
//! Every language front end implements [`ParserAdapter`] and is registered in
//! an [`AdapterRegistry`] under its language tag. The rest of the engine only
//! ever sees [`SyntaxTree`]s and never branches on a language name.

pub mod language;
pub mod rules;
pub mod treesitter;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use language::SupportedLanguage;
pub use treesitter::TreeSitterAdapter;

/// Structural role of a normalized node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyntaxKind {
    /// A module, namespace, or the file itself.
    Module,
    /// A class, struct, trait, interface, enum or impl block.
    Type,
    /// A function or method.
    Function,
    /// A field, property or enum variant.
    Field,
    /// An import statement. Children are the imported names.
    Import,
    /// A call. `name` holds the callee path, segments joined by `.`.
    Call,
    /// A constructor use (`new Foo()`, `Foo { .. }`).
    Instantiate,
    /// A base type named by the enclosing declaration.
    Inherit,
    /// A type-position identifier use.
    Identifier,
    /// A region the backend could not parse.
    Error,
}

impl fmt::Display for SyntaxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyntaxKind::Module => "module",
            SyntaxKind::Type => "type",
            SyntaxKind::Function => "function",
            SyntaxKind::Field => "field",
            SyntaxKind::Import => "import",
            SyntaxKind::Call => "call",
            SyntaxKind::Instantiate => "instantiate",
            SyntaxKind::Inherit => "inherit",
            SyntaxKind::Identifier => "identifier",
            SyntaxKind::Error => "error",
        };
        f.write_str(s)
    }
}

/// `type_hint` on a call whose receiver is resolved at runtime.
pub const HINT_MEMBER_CALL: &str = "member";

/// A source region. Lines are 1-indexed, columns 0-indexed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub line_start: usize,
    pub col_start: usize,
    pub line_end: usize,
    pub col_end: usize,
}

impl Span {
    pub fn new(line_start: usize, col_start: usize, line_end: usize, col_end: usize) -> Self {
        Self {
            line_start,
            col_start,
            line_end,
            col_end,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line_start, self.col_start)
    }
}

/// One node of a normalized tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxNode {
    pub kind: SyntaxKind,
    pub name: Option<String>,
    pub span: Span,
    pub children: Vec<SyntaxNode>,
    pub type_hint: Option<String>,
}

impl SyntaxNode {
    pub fn new(kind: SyntaxKind, name: Option<String>, span: Span) -> Self {
        Self {
            kind,
            name,
            span,
            children: Vec::new(),
            type_hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.type_hint = Some(hint.into());
        self
    }

    pub fn with_children(mut self, children: Vec<SyntaxNode>) -> Self {
        self.children = children;
        self
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn size(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }

    /// Depth-first pre-order walk.
    pub fn walk(&self) -> Vec<&SyntaxNode> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }
}

/// A normalized tree for one source file. The root is always a
/// [`SyntaxKind::Module`] node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxTree {
    pub language: String,
    pub root: SyntaxNode,
}

impl SyntaxTree {
    pub fn empty(language: &str) -> Self {
        Self {
            language: language.to_string(),
            root: SyntaxNode::new(SyntaxKind::Module, None, Span::default()),
        }
    }

    pub fn has_errors(&self) -> bool {
        self.root.walk().iter().any(|n| n.kind == SyntaxKind::Error)
    }
}

/// Parsing failed, but `partial` still holds every well-formed region.
#[derive(Debug, Clone, Error)]
#[error("parse error: {reason}")]
pub struct ParseError {
    pub reason: String,
    pub partial: SyntaxTree,
}

/// A language front end.
///
/// Implementations must be deterministic and side-effect free: the same text
/// always yields the same tree.
pub trait ParserAdapter: Send + Sync {
    /// Registry tag, e.g. `"rust"`.
    fn language(&self) -> &str;

    fn parse(&self, text: &str) -> Result<SyntaxTree, ParseError>;
}

/// Language tag → adapter.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<String, Arc<dyn ParserAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with a tree-sitter adapter for every bundled language.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for language in SupportedLanguage::ALL {
            registry.register(Arc::new(TreeSitterAdapter::new(language)));
        }
        registry
    }

    /// Register an adapter, replacing any previous one for the same tag.
    pub fn register(&mut self, adapter: Arc<dyn ParserAdapter>) {
        self.adapters.insert(adapter.language().to_string(), adapter);
    }

    pub fn get(&self, language: &str) -> Option<&Arc<dyn ParserAdapter>> {
        self.adapters.get(language)
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }

    /// Dispatch `text` to the adapter registered for `language`.
    /// Returns `None` when no adapter is registered.
    pub fn parse(&self, language: &str, text: &str) -> Option<Result<SyntaxTree, ParseError>> {
        self.get(language).map(|adapter| adapter.parse(text))
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("languages", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LineAdapter;

    /// Treats every non-empty line as a function declaration.
    impl ParserAdapter for LineAdapter {
        fn language(&self) -> &str {
            "lines"
        }

        fn parse(&self, text: &str) -> Result<SyntaxTree, ParseError> {
            let children = text
                .lines()
                .enumerate()
                .filter(|(_, l)| !l.trim().is_empty())
                .map(|(i, l)| {
                    SyntaxNode::new(
                        SyntaxKind::Function,
                        Some(l.trim().to_string()),
                        Span::new(i + 1, 0, i + 1, l.len()),
                    )
                })
                .collect();
            Ok(SyntaxTree {
                language: "lines".to_string(),
                root: SyntaxNode::new(SyntaxKind::Module, None, Span::default())
                    .with_children(children),
            })
        }
    }

    #[test]
    fn test_registry_dispatch_by_tag() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(LineAdapter));

        let tree = registry.parse("lines", "a\n\nb\n").unwrap().unwrap();
        assert_eq!(tree.root.children.len(), 2);
        assert!(registry.parse("cobol", "x").is_none());
    }

    #[test]
    fn test_default_registry_languages() {
        let registry = AdapterRegistry::with_defaults();
        let tags: Vec<&str> = registry.languages().collect();
        for tag in ["rust", "python", "javascript", "typescript", "go", "java"] {
            assert!(tags.contains(&tag), "missing adapter for {tag}");
        }
    }

    #[test]
    fn test_walk_order_and_size() {
        let leaf = |n: &str| SyntaxNode::new(SyntaxKind::Function, Some(n.into()), Span::default());
        let root = SyntaxNode::new(SyntaxKind::Module, None, Span::default()).with_children(vec![
            SyntaxNode::new(SyntaxKind::Type, Some("T".into()), Span::default())
                .with_children(vec![leaf("a")]),
            leaf("b"),
        ]);
        let names: Vec<_> = root.walk().iter().map(|n| n.name.clone()).collect();
        assert_eq!(
            names,
            vec![None, Some("T".into()), Some("a".into()), Some("b".into())]
        );
        assert_eq!(root.size(), 4);
    }
}
