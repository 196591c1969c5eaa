use tree_sitter::Node;

use super::{
    split_path, text, CallRule, DeclRule, ImportItem, ImportSpec, InstRule, LanguageRules,
    MemberRule,
};
use crate::parser::SyntaxKind;

pub static RULES: LanguageRules = LanguageRules {
    decls: &[
        DeclRule::new("mod_item", SyntaxKind::Module, "mod"),
        DeclRule::new("struct_item", SyntaxKind::Type, "struct"),
        DeclRule::new("enum_item", SyntaxKind::Type, "enum"),
        DeclRule::new("union_item", SyntaxKind::Type, "union"),
        DeclRule::new("type_item", SyntaxKind::Type, "type_alias"),
        DeclRule::new("trait_item", SyntaxKind::Type, "trait").inherits(&["bounds"]),
        // impl blocks share the identity of their type and merge with it
        DeclRule::new("impl_item", SyntaxKind::Type, "impl")
            .named("type")
            .inherits(&["trait"]),
        DeclRule::new("function_item", SyntaxKind::Function, "function"),
        DeclRule::new("function_signature_item", SyntaxKind::Function, "function"),
        DeclRule::new("field_declaration", SyntaxKind::Field, "field"),
        DeclRule::new("enum_variant", SyntaxKind::Field, "variant"),
        DeclRule::new("const_item", SyntaxKind::Field, "const"),
        DeclRule::new("static_item", SyntaxKind::Field, "static"),
    ],
    calls: &[CallRule {
        node: "call_expression",
        callee: "function",
        receiver: None,
    }],
    members: &[MemberRule {
        node: "field_expression",
        object: "value",
        property: "field",
    }],
    instantiations: &[InstRule {
        node: "struct_expression",
        type_field: "name",
    }],
    inherit_nodes: &[],
    type_uses: &["type_identifier", "scoped_type_identifier"],
    static_paths: &["scoped_identifier", "scoped_type_identifier"],
    self_receivers: &["self", "Self"],
    skip: &[
        "line_comment",
        "block_comment",
        "string_literal",
        "raw_string_literal",
        "type_parameters",
        "lifetime",
        "attribute_item",
        "inner_attribute_item",
        "macro_definition",
    ],
    constructor_method: None,
    import_nodes: &["use_declaration"],
    import_fn: Some(imports),
};

fn imports(node: Node, source: &[u8]) -> Vec<ImportSpec> {
    let mut specs: Vec<ImportSpec> = Vec::new();
    if let Some(argument) = node.child_by_field_name("argument") {
        use_tree(argument, source, &mut specs);
    }
    specs
}

fn push_item(specs: &mut Vec<ImportSpec>, module: &[String], item: ImportItem) {
    let module = module.join(".");
    match specs.iter_mut().find(|s| s.module == module) {
        Some(spec) => spec.items.push(item),
        None => specs.push(ImportSpec {
            module,
            items: vec![item],
        }),
    }
}

fn push_path(specs: &mut Vec<ImportSpec>, prefix: &[String], path: &str, alias: Option<String>) {
    let mut segments = prefix.to_vec();
    segments.extend(split_path(path));
    // `use a::b::{self}` imports `b` itself
    if segments.last().is_some_and(|s| s == "self") {
        segments.pop();
    }
    if let Some(name) = segments.pop() {
        push_item(specs, &segments, ImportItem::aliased(name, alias));
    }
}

/// Flatten a use tree. Groups nest without bound, so the walk keeps its
/// own stack.
fn use_tree(root: Node, source: &[u8], specs: &mut Vec<ImportSpec>) {
    let mut stack: Vec<(Node, Vec<String>)> = vec![(root, Vec::new())];
    while let Some((node, prefix)) = stack.pop() {
        match node.kind() {
            "use_as_clause" => {
                let alias = node
                    .child_by_field_name("alias")
                    .map(|a| text(a, source).to_string());
                if let Some(path) = node.child_by_field_name("path") {
                    push_path(specs, &prefix, text(path, source), alias);
                }
            }
            "scoped_use_list" => {
                let mut nested = prefix;
                if let Some(path) = node.child_by_field_name("path") {
                    nested.extend(split_path(text(path, source)));
                }
                if let Some(list) = node.child_by_field_name("list") {
                    stack.push((list, nested));
                }
            }
            "use_list" => {
                let mut cursor = node.walk();
                let children: Vec<Node> = node.named_children(&mut cursor).collect();
                for child in children.into_iter().rev() {
                    stack.push((child, prefix.clone()));
                }
            }
            "use_wildcard" => {
                let mut module = prefix;
                module.extend(split_path(text(node, source).trim_end_matches('*')));
                push_item(specs, &module, ImportItem::new("*"));
            }
            _ => push_path(specs, &prefix, text(node, source), None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::Parser;

    fn parse_imports(code: &str) -> Vec<ImportSpec> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_rust::LANGUAGE.into())
            .unwrap();
        let tree = parser.parse(code, None).unwrap();
        let root = tree.root_node();
        let mut cursor = root.walk();
        let use_decl = root
            .named_children(&mut cursor)
            .find(|n| n.kind() == "use_declaration")
            .unwrap();
        imports(use_decl, code.as_bytes())
    }

    #[test]
    fn test_simple_path() {
        let specs = parse_imports("use crate::graph::CodeGraph;");
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].module, "crate.graph");
        assert_eq!(specs[0].items, vec![ImportItem::new("CodeGraph")]);
    }

    #[test]
    fn test_grouped_and_aliased() {
        let specs = parse_imports("use std::collections::{HashMap, BTreeMap as Tree};");
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].module, "std.collections");
        assert_eq!(
            specs[0].items,
            vec![
                ImportItem::new("HashMap"),
                ImportItem::aliased("BTreeMap", Some("Tree".to_string())),
            ]
        );
    }

    #[test]
    fn test_wildcard() {
        let specs = parse_imports("use super::types::*;");
        assert_eq!(specs[0].module, "super.types");
        assert_eq!(specs[0].items[0].name, "*");
    }
}
