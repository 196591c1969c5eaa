//! Per-language normalization tables.
//!
//! Each bundled grammar gets a static [`LanguageRules`] describing which
//! tree-sitter node kinds are declarations, calls, instantiations, imports and
//! type uses. [`TreeSitterAdapter`](super::TreeSitterAdapter) is the only
//! consumer; nothing else in the crate knows about grammar node kinds.

pub mod csharp;
pub mod go;
pub mod java;
pub mod javascript;
pub mod python;
pub mod ruby;
pub mod rust;

use tree_sitter::Node;

use super::SyntaxKind;

/// One imported module and the names pulled from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    /// Module path, segments joined by `.`. Empty for a bare `import x`.
    pub module: String,
    pub items: Vec<ImportItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportItem {
    /// Imported name, or `*` for a wildcard import.
    pub name: String,
    pub alias: Option<String>,
}

impl ImportItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
        }
    }

    pub fn aliased(name: impl Into<String>, alias: Option<String>) -> Self {
        Self {
            name: name.into(),
            alias,
        }
    }
}

pub type ImportFn = fn(Node, &[u8]) -> Vec<ImportSpec>;

/// Optional check on a declaration's value child.
#[derive(Debug, Clone, Copy)]
pub struct ValueRule {
    pub field: &'static str,
    /// Accepted value kinds and the type hint each implies.
    pub kinds: &'static [(&'static str, &'static str)],
    /// When set, a value outside `kinds` means the node is not a declaration.
    pub required: bool,
}

/// A node kind that declares a symbol.
#[derive(Debug, Clone, Copy)]
pub struct DeclRule {
    pub node: &'static str,
    pub kind: SyntaxKind,
    pub hint: &'static str,
    /// Path to the name node. Segments are field names or child kinds,
    /// separated by `/`.
    pub name: &'static str,
    pub value: Option<ValueRule>,
    /// Fields naming base types.
    pub inherit_fields: &'static [&'static str],
    /// Path to a type that owns this declaration even though it is written
    /// outside of it (Go method receivers).
    pub owner: Option<&'static str>,
}

impl DeclRule {
    pub const fn new(node: &'static str, kind: SyntaxKind, hint: &'static str) -> Self {
        Self {
            node,
            kind,
            hint,
            name: "name",
            value: None,
            inherit_fields: &[],
            owner: None,
        }
    }

    pub const fn named(mut self, path: &'static str) -> Self {
        self.name = path;
        self
    }

    pub const fn value(mut self, rule: ValueRule) -> Self {
        self.value = Some(rule);
        self
    }

    pub const fn inherits(mut self, fields: &'static [&'static str]) -> Self {
        self.inherit_fields = fields;
        self
    }

    pub const fn owned_by(mut self, path: &'static str) -> Self {
        self.owner = Some(path);
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CallRule {
    pub node: &'static str,
    /// Field holding the callee expression, or just the method name when
    /// `receiver` is set.
    pub callee: &'static str,
    pub receiver: Option<&'static str>,
}

/// `object.property` expressions that can appear as a callee.
#[derive(Debug, Clone, Copy)]
pub struct MemberRule {
    pub node: &'static str,
    pub object: &'static str,
    pub property: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct InstRule {
    pub node: &'static str,
    pub type_field: &'static str,
}

pub struct LanguageRules {
    pub decls: &'static [DeclRule],
    pub calls: &'static [CallRule],
    pub members: &'static [MemberRule],
    pub instantiations: &'static [InstRule],
    /// Child kinds of a declaration that list its base types.
    pub inherit_nodes: &'static [&'static str],
    /// Kinds emitted as type-position identifier uses.
    pub type_uses: &'static [&'static str],
    /// Kinds whose text is a static path (`a::b::c`).
    pub static_paths: &'static [&'static str],
    pub self_receivers: &'static [&'static str],
    /// Subtrees that are never descended.
    pub skip: &'static [&'static str],
    /// Method name that constructs its receiver (`Foo.new`).
    pub constructor_method: Option<&'static str>,
    pub import_nodes: &'static [&'static str],
    pub import_fn: Option<ImportFn>,
}

impl LanguageRules {
    pub fn decl(&self, kind: &str) -> Option<&DeclRule> {
        self.decls.iter().find(|r| r.node == kind)
    }

    pub fn call(&self, kind: &str) -> Option<&CallRule> {
        self.calls.iter().find(|r| r.node == kind)
    }

    pub fn member(&self, kind: &str) -> Option<&MemberRule> {
        self.members.iter().find(|r| r.node == kind)
    }

    pub fn instantiation(&self, kind: &str) -> Option<&InstRule> {
        self.instantiations.iter().find(|r| r.node == kind)
    }

    pub fn is_import(&self, kind: &str) -> bool {
        self.import_nodes.contains(&kind)
    }

    pub fn is_skipped(&self, kind: &str) -> bool {
        self.skip.contains(&kind)
    }
}

// ─── Node helpers shared by the rule tables ─────────────────────

pub(crate) fn text<'a>(node: Node, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

/// Follow a `/`-separated path of field names or child kinds.
pub(crate) fn resolve_path<'t>(node: Node<'t>, path: &str) -> Option<Node<'t>> {
    let mut current = node;
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        current = match current.child_by_field_name(segment) {
            Some(child) => child,
            None => {
                let mut cursor = current.walk();
                let found = current
                    .named_children(&mut cursor)
                    .find(|c| c.kind() == segment);
                found?
            }
        };
    }
    Some(current)
}

/// Drop balanced `<...>` generic arguments.
pub(crate) fn strip_generics(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '<' => depth += 1,
            '>' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

/// Split a path expression into its segments: `a::b::<T>::c` → `[a, b, c]`.
pub(crate) fn split_path(text: &str) -> Vec<String> {
    let stripped = strip_generics(text);
    stripped
        .split(|c: char| c == ':' || c == '.' || c == '/')
        .map(|s| s.trim_matches(|c: char| c.is_whitespace() || c == '&' || c == '*' || c == '@'))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Last segment of a path-like name (`fmt::Display` → `Display`).
pub(crate) fn last_segment(text: &str) -> Option<String> {
    split_path(text).pop()
}

/// Strip quotes and turn a file-like module specifier into a dotted path:
/// `"./lib/utils.js"` → `lib.utils`.
pub(crate) fn module_from_specifier(raw: &str) -> String {
    let unquoted = raw.trim_matches(|c| c == '"' || c == '\'' || c == '`');
    let without_ext = match unquoted.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains('/') && !stem.is_empty() && !stem.ends_with('.') => {
            match ext {
                "js" | "mjs" | "cjs" | "ts" | "tsx" | "jsx" | "py" | "rb" => stem,
                _ => unquoted,
            }
        }
        _ => unquoted,
    };
    without_ext
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("a::b::c"), vec!["a", "b", "c"]);
        assert_eq!(split_path("Vec::<u8>::new"), vec!["Vec", "new"]);
        assert_eq!(split_path("self.repo"), vec!["self", "repo"]);
        assert_eq!(split_path("&mut"), vec!["mut"]);
        assert!(split_path("").is_empty());
    }

    #[test]
    fn test_last_segment_strips_generics() {
        assert_eq!(last_segment("HashMap<K, V>").as_deref(), Some("HashMap"));
        assert_eq!(last_segment("fmt::Display").as_deref(), Some("Display"));
    }

    #[test]
    fn test_module_from_specifier() {
        assert_eq!(module_from_specifier("\"./lib/utils.js\""), "lib.utils");
        assert_eq!(module_from_specifier("'../api'"), "api");
        assert_eq!(module_from_specifier("\"github.com/acme/kit\""), "github.com.acme.kit");
        assert_eq!(module_from_specifier("'react'"), "react");
    }
}
