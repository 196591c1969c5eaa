//! JavaScript and TypeScript share one table; TypeScript adds the declaration
//! kinds that only exist in its grammar.

use tree_sitter::Node;

use super::{
    module_from_specifier, text, CallRule, DeclRule, ImportItem, ImportSpec, InstRule,
    LanguageRules, MemberRule, ValueRule,
};
use crate::parser::SyntaxKind;

const FUNCTION_VALUE: ValueRule = ValueRule {
    field: "value",
    kinds: &[
        ("arrow_function", "function"),
        ("function_expression", "function"),
        ("function", "function"),
        ("generator_function", "function"),
    ],
    required: true,
};

const CALLS: &[CallRule] = &[CallRule {
    node: "call_expression",
    callee: "function",
    receiver: None,
}];

const MEMBERS: &[MemberRule] = &[MemberRule {
    node: "member_expression",
    object: "object",
    property: "property",
}];

const INSTANTIATIONS: &[InstRule] = &[InstRule {
    node: "new_expression",
    type_field: "constructor",
}];

const SKIP: &[&str] = &[
    "comment",
    "string",
    "template_string",
    "regex",
    "type_parameters",
];

pub static JAVASCRIPT: LanguageRules = LanguageRules {
    decls: &[
        DeclRule::new("class_declaration", SyntaxKind::Type, "class"),
        DeclRule::new("function_declaration", SyntaxKind::Function, "function"),
        DeclRule::new("generator_function_declaration", SyntaxKind::Function, "function"),
        DeclRule::new("method_definition", SyntaxKind::Function, "method"),
        DeclRule::new("field_definition", SyntaxKind::Field, "field").named("property"),
        DeclRule::new("variable_declarator", SyntaxKind::Function, "function").value(FUNCTION_VALUE),
    ],
    calls: CALLS,
    members: MEMBERS,
    instantiations: INSTANTIATIONS,
    inherit_nodes: &["class_heritage"],
    type_uses: &[],
    static_paths: &[],
    self_receivers: &["this", "super"],
    skip: SKIP,
    constructor_method: None,
    import_nodes: &["import_statement"],
    import_fn: Some(imports),
};

pub static TYPESCRIPT: LanguageRules = LanguageRules {
    decls: &[
        DeclRule::new("class_declaration", SyntaxKind::Type, "class"),
        DeclRule::new("abstract_class_declaration", SyntaxKind::Type, "class"),
        DeclRule::new("interface_declaration", SyntaxKind::Type, "interface"),
        DeclRule::new("enum_declaration", SyntaxKind::Type, "enum"),
        DeclRule::new("type_alias_declaration", SyntaxKind::Type, "type_alias"),
        DeclRule::new("internal_module", SyntaxKind::Module, "namespace"),
        DeclRule::new("module", SyntaxKind::Module, "namespace"),
        DeclRule::new("function_declaration", SyntaxKind::Function, "function"),
        DeclRule::new("generator_function_declaration", SyntaxKind::Function, "function"),
        DeclRule::new("function_signature", SyntaxKind::Function, "function"),
        DeclRule::new("method_definition", SyntaxKind::Function, "method"),
        DeclRule::new("method_signature", SyntaxKind::Function, "method"),
        DeclRule::new("abstract_method_signature", SyntaxKind::Function, "method"),
        DeclRule::new("public_field_definition", SyntaxKind::Field, "field"),
        DeclRule::new("property_signature", SyntaxKind::Field, "field"),
        DeclRule::new("variable_declarator", SyntaxKind::Function, "function").value(FUNCTION_VALUE),
    ],
    calls: CALLS,
    members: MEMBERS,
    instantiations: INSTANTIATIONS,
    inherit_nodes: &["class_heritage", "extends_type_clause"],
    type_uses: &["type_identifier", "nested_type_identifier"],
    static_paths: &["nested_type_identifier"],
    self_receivers: &["this", "super"],
    skip: SKIP,
    constructor_method: None,
    import_nodes: &["import_statement"],
    import_fn: Some(imports),
};

fn imports(node: Node, source: &[u8]) -> Vec<ImportSpec> {
    let Some(source_node) = node.child_by_field_name("source") else {
        return Vec::new();
    };
    let module = module_from_specifier(text(source_node, source));
    let mut items = Vec::new();

    let mut cursor = node.walk();
    for clause in node
        .named_children(&mut cursor)
        .filter(|c| c.kind() == "import_clause")
    {
        let mut clause_cursor = clause.walk();
        for part in clause.named_children(&mut clause_cursor) {
            match part.kind() {
                // default import
                "identifier" => items.push(ImportItem::aliased(
                    "default",
                    Some(text(part, source).to_string()),
                )),
                "namespace_import" => {
                    let alias = {
                        let mut c = part.walk();
                        let found = part
                            .named_children(&mut c)
                            .find(|n| n.kind() == "identifier")
                            .map(|n| text(n, source).to_string());
                        found
                    };
                    items.push(ImportItem::aliased("*", alias));
                }
                "named_imports" => {
                    let mut spec_cursor = part.walk();
                    for spec in part
                        .named_children(&mut spec_cursor)
                        .filter(|n| n.kind() == "import_specifier")
                    {
                        if let Some(name) = spec.child_by_field_name("name") {
                            let alias = spec
                                .child_by_field_name("alias")
                                .map(|a| text(a, source).to_string());
                            items.push(ImportItem::aliased(text(name, source), alias));
                        }
                    }
                }
                _ => {}
            }
        }
    }

    // side-effect import: `import "./polyfill"`
    if items.is_empty() {
        items.push(ImportItem::new("*"));
    }
    vec![ImportSpec { module, items }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::Parser;

    fn parse_imports(code: &str) -> Vec<ImportSpec> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_javascript::LANGUAGE.into())
            .unwrap();
        let tree = parser.parse(code, None).unwrap();
        let root = tree.root_node();
        let mut cursor = root.walk();
        let stmt = root.named_children(&mut cursor).next().unwrap();
        imports(stmt, code.as_bytes())
    }

    #[test]
    fn test_named_imports() {
        let specs = parse_imports("import { load, save as persist } from './store.js';\n");
        assert_eq!(specs[0].module, "store");
        assert_eq!(
            specs[0].items,
            vec![
                ImportItem::new("load"),
                ImportItem::aliased("save", Some("persist".to_string())),
            ]
        );
    }

    #[test]
    fn test_default_and_namespace() {
        let specs = parse_imports("import React, * as all from 'react';\n");
        assert_eq!(specs[0].module, "react");
        assert_eq!(specs[0].items.len(), 2);
        assert_eq!(specs[0].items[0].alias.as_deref(), Some("React"));
        assert_eq!(specs[0].items[1].name, "*");
    }
}
