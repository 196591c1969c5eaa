use tree_sitter::Node;

use super::{module_from_specifier, text, CallRule, DeclRule, ImportItem, ImportSpec, LanguageRules};
use crate::parser::SyntaxKind;

pub static RULES: LanguageRules = LanguageRules {
    decls: &[
        DeclRule::new("module", SyntaxKind::Module, "module"),
        DeclRule::new("class", SyntaxKind::Type, "class").inherits(&["superclass"]),
        DeclRule::new("method", SyntaxKind::Function, "method"),
        DeclRule::new("singleton_method", SyntaxKind::Function, "method"),
    ],
    calls: &[CallRule {
        node: "call",
        callee: "method",
        receiver: Some("receiver"),
    }],
    members: &[],
    instantiations: &[],
    inherit_nodes: &[],
    type_uses: &[],
    static_paths: &["constant", "scope_resolution"],
    self_receivers: &["self"],
    skip: &["comment", "string", "heredoc_body"],
    constructor_method: Some("new"),
    // only `require` calls yield specs, every other call falls through
    import_nodes: &["call"],
    import_fn: Some(imports),
};

/// `require "x"` and `require_relative "lib/x"` load every top-level name
/// of the file, so each becomes a wildcard import of that file's module.
fn imports(node: Node, source: &[u8]) -> Vec<ImportSpec> {
    if node.child_by_field_name("receiver").is_some() {
        return Vec::new();
    }
    let is_require = node
        .child_by_field_name("method")
        .is_some_and(|m| matches!(text(m, source), "require" | "require_relative"));
    if !is_require {
        return Vec::new();
    }
    let Some(arguments) = node.child_by_field_name("arguments") else {
        return Vec::new();
    };
    let mut cursor = arguments.walk();
    let path = arguments
        .named_children(&mut cursor)
        .find(|c| c.kind() == "string");
    let Some(path) = path else {
        return Vec::new();
    };
    let module = module_from_specifier(text(path, source));
    if module.is_empty() {
        return Vec::new();
    }
    vec![ImportSpec {
        module,
        items: vec![ImportItem::new("*")],
    }]
}
