use tree_sitter::Node;

use super::{split_path, text, CallRule, DeclRule, ImportItem, ImportSpec, LanguageRules, MemberRule};
use crate::parser::SyntaxKind;

pub static RULES: LanguageRules = LanguageRules {
    decls: &[
        DeclRule::new("class_definition", SyntaxKind::Type, "class").inherits(&["superclasses"]),
        DeclRule::new("function_definition", SyntaxKind::Function, "function"),
    ],
    calls: &[CallRule {
        node: "call",
        callee: "function",
        receiver: None,
    }],
    members: &[MemberRule {
        node: "attribute",
        object: "object",
        property: "attribute",
    }],
    instantiations: &[],
    inherit_nodes: &[],
    type_uses: &[],
    static_paths: &["dotted_name"],
    self_receivers: &["self", "cls"],
    skip: &["comment", "string"],
    constructor_method: None,
    import_nodes: &["import_statement", "import_from_statement"],
    import_fn: Some(imports),
};

fn dotted(node: Node, source: &[u8]) -> Vec<String> {
    split_path(text(node, source))
}

/// `a.b` or `a.b as c` → (path segments, alias).
fn imported_name(node: Node, source: &[u8]) -> (Vec<String>, Option<String>) {
    if node.kind() == "aliased_import" {
        let path = node
            .child_by_field_name("name")
            .map(|n| dotted(n, source))
            .unwrap_or_default();
        let alias = node
            .child_by_field_name("alias")
            .map(|a| text(a, source).to_string());
        (path, alias)
    } else {
        (dotted(node, source), None)
    }
}

fn imports(node: Node, source: &[u8]) -> Vec<ImportSpec> {
    let mut specs: Vec<ImportSpec> = Vec::new();
    let mut cursor = node.walk();
    match node.kind() {
        "import_statement" => {
            // `import a.b as c` binds module `a.b`; keep its last segment as the name
            for child in node.children_by_field_name("name", &mut cursor) {
                let (mut path, alias) = imported_name(child, source);
                if let Some(name) = path.pop() {
                    specs.push(ImportSpec {
                        module: path.join("."),
                        items: vec![ImportItem::aliased(name, alias)],
                    });
                }
            }
        }
        "import_from_statement" => {
            let module = node
                .child_by_field_name("module_name")
                .map(|m| dotted(m, source).join("."))
                .unwrap_or_default();
            let mut items: Vec<ImportItem> = node
                .children_by_field_name("name", &mut cursor)
                .filter_map(|child| {
                    let (mut path, alias) = imported_name(child, source);
                    path.pop().map(|name| ImportItem::aliased(name, alias))
                })
                .collect();
            let mut cursor = node.walk();
            if node
                .named_children(&mut cursor)
                .any(|c| c.kind() == "wildcard_import")
            {
                items.push(ImportItem::new("*"));
            }
            if !items.is_empty() {
                specs.push(ImportSpec { module, items });
            }
        }
        _ => {}
    }
    specs
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::Parser;

    fn parse_imports(code: &str) -> Vec<ImportSpec> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .unwrap();
        let tree = parser.parse(code, None).unwrap();
        let root = tree.root_node();
        let mut cursor = root.walk();
        let stmt = root.named_children(&mut cursor).next().unwrap();
        imports(stmt, code.as_bytes())
    }

    #[test]
    fn test_plain_import() {
        let specs = parse_imports("import os.path as p\n");
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].module, "os");
        assert_eq!(
            specs[0].items,
            vec![ImportItem::aliased("path", Some("p".to_string()))]
        );
    }

    #[test]
    fn test_from_import() {
        let specs = parse_imports("from pkg.utils import helper, Other as O\n");
        assert_eq!(specs[0].module, "pkg.utils");
        let names: Vec<&str> = specs[0].items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["helper", "Other"]);
    }

    #[test]
    fn test_relative_wildcard_import() {
        let specs = parse_imports("from .models import *\n");
        assert_eq!(specs[0].module, "models");
        assert_eq!(specs[0].items, vec![ImportItem::new("*")]);
    }
}
