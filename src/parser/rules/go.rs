use tree_sitter::Node;

use super::{
    split_path, text, CallRule, DeclRule, ImportItem, ImportSpec, InstRule, LanguageRules,
    MemberRule, ValueRule,
};
use crate::parser::SyntaxKind;

pub static RULES: LanguageRules = LanguageRules {
    decls: &[
        DeclRule::new("function_declaration", SyntaxKind::Function, "function"),
        // methods are declared at file level and attached to their receiver type
        DeclRule::new("method_declaration", SyntaxKind::Function, "method")
            .owned_by("receiver/parameter_declaration/type"),
        DeclRule::new("type_spec", SyntaxKind::Type, "type").value(ValueRule {
            field: "type",
            kinds: &[("struct_type", "struct"), ("interface_type", "interface")],
            required: false,
        }),
        DeclRule::new("type_alias", SyntaxKind::Type, "type_alias"),
        DeclRule::new("field_declaration", SyntaxKind::Field, "field"),
        DeclRule::new("method_elem", SyntaxKind::Function, "method"),
        DeclRule::new("method_spec", SyntaxKind::Function, "method"),
    ],
    calls: &[CallRule {
        node: "call_expression",
        callee: "function",
        receiver: None,
    }],
    members: &[MemberRule {
        node: "selector_expression",
        object: "operand",
        property: "field",
    }],
    instantiations: &[InstRule {
        node: "composite_literal",
        type_field: "type",
    }],
    inherit_nodes: &[],
    type_uses: &["type_identifier", "qualified_type"],
    static_paths: &["qualified_type"],
    self_receivers: &[],
    skip: &[
        "comment",
        "interpreted_string_literal",
        "raw_string_literal",
        "type_parameter_list",
        "package_clause",
    ],
    constructor_method: None,
    import_nodes: &["import_declaration"],
    import_fn: Some(imports),
};

fn import_spec(node: Node, source: &[u8]) -> Option<ImportSpec> {
    let path = node.child_by_field_name("path")?;
    let raw = text(path, source).trim_matches(|c| c == '"' || c == '`');
    let mut segments = split_path(raw);
    let name = segments.pop()?;
    let alias = node
        .child_by_field_name("name")
        .map(|n| text(n, source).to_string())
        .filter(|a| a != "_");
    let item = if alias.as_deref() == Some(".") {
        ImportItem::new("*")
    } else {
        ImportItem::aliased(name.clone(), alias)
    };
    let module = if item.name == "*" {
        segments.push(name);
        segments.join(".")
    } else {
        segments.join(".")
    };
    Some(ImportSpec {
        module,
        items: vec![item],
    })
}

fn imports(node: Node, source: &[u8]) -> Vec<ImportSpec> {
    let mut specs = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "import_spec" => specs.extend(import_spec(child, source)),
            "import_spec_list" => {
                let mut inner = child.walk();
                specs.extend(
                    child
                        .named_children(&mut inner)
                        .filter(|c| c.kind() == "import_spec")
                        .filter_map(|c| import_spec(c, source)),
                );
            }
            _ => {}
        }
    }
    specs
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::Parser;

    #[test]
    fn test_grouped_imports() {
        let code = "package main\n\nimport (\n\t\"fmt\"\n\tk \"github.com/acme/kit\"\n)\n";
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_go::LANGUAGE.into()).unwrap();
        let tree = parser.parse(code, None).unwrap();
        let root = tree.root_node();
        let mut cursor = root.walk();
        let decl = root
            .named_children(&mut cursor)
            .find(|n| n.kind() == "import_declaration")
            .unwrap();

        let specs = imports(decl, code.as_bytes());
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].module, "");
        assert_eq!(specs[0].items[0].name, "fmt");
        assert_eq!(specs[1].module, "github.com.acme");
        assert_eq!(specs[1].items[0].name, "kit");
        assert_eq!(specs[1].items[0].alias.as_deref(), Some("k"));
    }
}
