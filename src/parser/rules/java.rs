use tree_sitter::Node;

use super::{
    split_path, text, CallRule, DeclRule, ImportItem, ImportSpec, InstRule, LanguageRules,
    MemberRule,
};
use crate::parser::SyntaxKind;

pub static RULES: LanguageRules = LanguageRules {
    decls: &[
        DeclRule::new("class_declaration", SyntaxKind::Type, "class")
            .inherits(&["superclass", "interfaces"]),
        DeclRule::new("interface_declaration", SyntaxKind::Type, "interface"),
        DeclRule::new("enum_declaration", SyntaxKind::Type, "enum").inherits(&["interfaces"]),
        DeclRule::new("record_declaration", SyntaxKind::Type, "record").inherits(&["interfaces"]),
        DeclRule::new("method_declaration", SyntaxKind::Function, "method"),
        DeclRule::new("constructor_declaration", SyntaxKind::Function, "constructor"),
        DeclRule::new("field_declaration", SyntaxKind::Field, "field").named("declarator/name"),
        DeclRule::new("constant_declaration", SyntaxKind::Field, "const").named("declarator/name"),
        DeclRule::new("enum_constant", SyntaxKind::Field, "variant"),
    ],
    calls: &[CallRule {
        node: "method_invocation",
        callee: "name",
        receiver: Some("object"),
    }],
    members: &[MemberRule {
        node: "field_access",
        object: "object",
        property: "field",
    }],
    instantiations: &[InstRule {
        node: "object_creation_expression",
        type_field: "type",
    }],
    inherit_nodes: &["extends_interfaces"],
    type_uses: &["type_identifier", "scoped_type_identifier"],
    static_paths: &["scoped_identifier", "scoped_type_identifier"],
    self_receivers: &["this", "super"],
    skip: &[
        "line_comment",
        "block_comment",
        "string_literal",
        "type_parameters",
        "package_declaration",
        "marker_annotation",
        "annotation",
    ],
    constructor_method: None,
    import_nodes: &["import_declaration"],
    import_fn: Some(imports),
};

fn imports(node: Node, source: &[u8]) -> Vec<ImportSpec> {
    let mut cursor = node.walk();
    let mut path: Option<Vec<String>> = None;
    let mut wildcard = false;
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "scoped_identifier" | "identifier" => path = Some(split_path(text(child, source))),
            "asterisk" => wildcard = true,
            _ => {}
        }
    }
    let Some(mut segments) = path else {
        return Vec::new();
    };
    let item = if wildcard {
        ImportItem::new("*")
    } else {
        match segments.pop() {
            Some(name) => ImportItem::new(name),
            None => return Vec::new(),
        }
    };
    vec![ImportSpec {
        module: segments.join("."),
        items: vec![item],
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::Parser;

    fn parse_imports(code: &str) -> Vec<ImportSpec> {
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_java::LANGUAGE.into()).unwrap();
        let tree = parser.parse(code, None).unwrap();
        let root = tree.root_node();
        let mut cursor = root.walk();
        let decl = root
            .named_children(&mut cursor)
            .find(|n| n.kind() == "import_declaration")
            .unwrap();
        imports(decl, code.as_bytes())
    }

    #[test]
    fn test_single_type_import() {
        let specs = parse_imports("import java.util.List;\n");
        assert_eq!(specs[0].module, "java.util");
        assert_eq!(specs[0].items, vec![ImportItem::new("List")]);
    }

    #[test]
    fn test_on_demand_import() {
        let specs = parse_imports("import com.acme.model.*;\n");
        assert_eq!(specs[0].module, "com.acme.model");
        assert_eq!(specs[0].items, vec![ImportItem::new("*")]);
    }
}
