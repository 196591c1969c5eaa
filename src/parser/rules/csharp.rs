use tree_sitter::Node;

use super::{split_path, text, CallRule, DeclRule, ImportItem, ImportSpec, InstRule, LanguageRules, MemberRule};
use crate::parser::SyntaxKind;

pub static RULES: LanguageRules = LanguageRules {
    decls: &[
        DeclRule::new("namespace_declaration", SyntaxKind::Module, "namespace"),
        DeclRule::new("file_scoped_namespace_declaration", SyntaxKind::Module, "namespace"),
        DeclRule::new("class_declaration", SyntaxKind::Type, "class"),
        DeclRule::new("struct_declaration", SyntaxKind::Type, "struct"),
        DeclRule::new("interface_declaration", SyntaxKind::Type, "interface"),
        DeclRule::new("record_declaration", SyntaxKind::Type, "record"),
        DeclRule::new("enum_declaration", SyntaxKind::Type, "enum"),
        DeclRule::new("method_declaration", SyntaxKind::Function, "method"),
        DeclRule::new("constructor_declaration", SyntaxKind::Function, "constructor"),
        DeclRule::new("property_declaration", SyntaxKind::Field, "property"),
        DeclRule::new("field_declaration", SyntaxKind::Field, "field")
            .named("variable_declaration/variable_declarator/name"),
        DeclRule::new("enum_member_declaration", SyntaxKind::Field, "variant"),
    ],
    calls: &[CallRule {
        node: "invocation_expression",
        callee: "function",
        receiver: None,
    }],
    members: &[MemberRule {
        node: "member_access_expression",
        object: "expression",
        property: "name",
    }],
    instantiations: &[InstRule {
        node: "object_creation_expression",
        type_field: "type",
    }],
    inherit_nodes: &["base_list"],
    type_uses: &[],
    static_paths: &["qualified_name"],
    self_receivers: &["this", "base"],
    skip: &[
        "comment",
        "string_literal",
        "verbatim_string_literal",
        "interpolated_string_expression",
        "type_parameter_list",
        "attribute_list",
    ],
    constructor_method: None,
    import_nodes: &["using_directive"],
    import_fn: Some(imports),
};

/// `using A.B;` imports every name of the namespace; `using X = A.B.C;`
/// binds one name under an alias.
fn imports(node: Node, source: &[u8]) -> Vec<ImportSpec> {
    let alias = node
        .child_by_field_name("name")
        .map(|n| text(n, source).to_string());
    let mut cursor = node.walk();
    let target = node
        .named_children(&mut cursor)
        .filter(|c| matches!(c.kind(), "qualified_name" | "identifier"))
        .last();
    let Some(target) = target else {
        return Vec::new();
    };
    let mut segments = split_path(text(target, source));
    if alias.is_some() {
        let Some(name) = segments.pop() else {
            return Vec::new();
        };
        return vec![ImportSpec {
            module: segments.join("."),
            items: vec![ImportItem::aliased(name, alias)],
        }];
    }
    vec![ImportSpec {
        module: segments.join("."),
        items: vec![ImportItem::new("*")],
    }]
}
