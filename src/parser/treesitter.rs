//! Tree-sitter backed [`ParserAdapter`].
//!
//! The concrete syntax tree is folded into the normalized node set using the
//! grammar's [`LanguageRules`]. Declarations, references, imports and error
//! regions are kept; every other node is dissolved and its children lifted
//! into the nearest kept ancestor.

use tree_sitter::{Node, Parser};
use tracing::debug;

use super::rules::{
    last_segment, resolve_path, split_path, text, CallRule, DeclRule, InstRule, LanguageRules,
};
use super::{
    ParseError, ParserAdapter, Span, SupportedLanguage, SyntaxKind, SyntaxNode, SyntaxTree,
    HINT_MEMBER_CALL,
};

/// Deepest concrete-tree nesting that is normalized. Anything below is
/// replaced by an error node and the parse is reported as partial.
pub const MAX_NESTING: usize = 256;

/// Kinds inside a base-type list that never name a base type.
const BASE_LIST_NOISE: &[&str] = &[
    "keyword_argument",
    "type_arguments",
    "type_argument_list",
    "type_parameters",
    "lifetime",
    "comment",
];

#[derive(Debug, Clone, Copy)]
pub struct TreeSitterAdapter {
    language: SupportedLanguage,
}

impl TreeSitterAdapter {
    pub fn new(language: SupportedLanguage) -> Self {
        Self { language }
    }
}

impl ParserAdapter for TreeSitterAdapter {
    fn language(&self) -> &str {
        self.language.tag()
    }

    fn parse(&self, text: &str) -> Result<SyntaxTree, ParseError> {
        let tag = self.language.tag();
        let mut parser = Parser::new();
        if let Err(e) = parser.set_language(&self.language.tree_sitter_language()) {
            return Err(ParseError {
                reason: format!("failed to load {} grammar: {}", self.language.name(), e),
                partial: SyntaxTree::empty(tag),
            });
        }
        let Some(tree) = parser.parse(text, None) else {
            return Err(ParseError {
                reason: "parser produced no tree".to_string(),
                partial: SyntaxTree::empty(tag),
            });
        };

        let root = tree.root_node();
        let mut normalizer = Normalizer {
            rules: self.language.rules(),
            source: text.as_bytes(),
            owned: Vec::new(),
            depth: 0,
            too_deep: None,
        };
        let children = normalizer.children(root, &[], false);
        let mut root_node =
            SyntaxNode::new(SyntaxKind::Module, None, span_of(root)).with_children(children);
        normalizer.attach_owned(&mut root_node);

        let normalized = SyntaxTree {
            language: tag.to_string(),
            root: root_node,
        };

        if let Some(line) = normalizer.too_deep {
            let reason = format!("nesting deeper than {} levels at line {}", MAX_NESTING, line);
            debug!(language = tag, %reason, "partial parse");
            return Err(ParseError {
                reason,
                partial: normalized,
            });
        }
        if root.has_error() {
            let reason = match first_error(root) {
                Some(node) if node.is_missing() => format!(
                    "missing {} at line {}",
                    node.kind(),
                    node.start_position().row + 1
                ),
                Some(node) => format!("syntax error at line {}", node.start_position().row + 1),
                None => "syntax error".to_string(),
            };
            debug!(language = tag, %reason, nodes = normalized.root.size(), "partial parse");
            return Err(ParseError {
                reason,
                partial: normalized,
            });
        }
        Ok(normalized)
    }
}

fn span_of(node: Node) -> Span {
    let start = node.start_position();
    let end = node.end_position();
    Span::new(start.row + 1, start.column, end.row + 1, end.column)
}

/// Follow the first erroneous child down to the error itself.
fn first_error(root: Node) -> Option<Node> {
    let mut node = root;
    loop {
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        let mut cursor = node.walk();
        let next = node.children(&mut cursor).find(|c| c.has_error());
        node = next?;
    }
}

struct Normalizer<'s> {
    rules: &'static LanguageRules,
    source: &'s [u8],
    /// Declarations written outside the type that owns them, keyed by owner name.
    owned: Vec<(String, SyntaxNode)>,
    depth: usize,
    /// First line where nesting hit [`MAX_NESTING`].
    too_deep: Option<usize>,
}

impl<'s> Normalizer<'s> {
    fn text(&self, node: Node) -> &'s str {
        text(node, self.source)
    }

    /// Normalize every named child of `node` except those in `skip`.
    fn children(&mut self, node: Node, skip: &[usize], in_type: bool) -> Vec<SyntaxNode> {
        let mut cursor = node.walk();
        let kids: Vec<Node> = node.children(&mut cursor).collect();
        let mut out = Vec::new();
        for child in kids {
            if skip.contains(&child.id()) || (!child.is_named() && !child.is_missing()) {
                continue;
            }
            out.extend(self.convert(child, in_type));
        }
        out
    }

    fn convert(&mut self, node: Node, in_type: bool) -> Vec<SyntaxNode> {
        if self.depth >= MAX_NESTING {
            self.too_deep.get_or_insert(node.start_position().row + 1);
            return vec![SyntaxNode::new(
                SyntaxKind::Error,
                Some("nesting too deep".to_string()),
                span_of(node),
            )];
        }
        self.depth += 1;
        let out = self.convert_node(node, in_type);
        self.depth -= 1;
        out
    }

    fn convert_node(&mut self, node: Node, in_type: bool) -> Vec<SyntaxNode> {
        if node.is_error() || node.is_missing() {
            let name = node.is_missing().then(|| format!("missing {}", node.kind()));
            return vec![SyntaxNode::new(SyntaxKind::Error, name, span_of(node))];
        }
        let kind = node.kind();
        let rules = self.rules;
        if rules.is_skipped(kind) {
            return Vec::new();
        }
        if rules.is_import(kind) {
            // a call kind that is not an import is still a call
            let imports = self.import(node);
            if !imports.is_empty() || rules.call(kind).is_none() {
                return imports;
            }
        }
        if let Some(rule) = rules.decl(kind) {
            return self.declaration(node, rule, in_type);
        }
        if let Some(rule) = rules.call(kind) {
            return self.call(node, rule);
        }
        if let Some(rule) = rules.instantiation(kind) {
            return self.instantiation(node, rule);
        }
        if rules.inherit_nodes.contains(&kind) {
            return self.base_types(node);
        }
        if rules.type_uses.contains(&kind) {
            let path = split_path(self.text(node));
            if path.is_empty() {
                return Vec::new();
            }
            return vec![SyntaxNode::new(
                SyntaxKind::Identifier,
                Some(path.join(".")),
                span_of(node),
            )];
        }
        self.children(node, &[], in_type)
    }

    fn declaration(&mut self, node: Node, rule: &DeclRule, in_type: bool) -> Vec<SyntaxNode> {
        let mut hint = rule.hint;
        let mut skip = Vec::new();

        if let Some(value) = rule.value {
            let matched = node.child_by_field_name(value.field).and_then(|v| {
                value
                    .kinds
                    .iter()
                    .find(|(k, _)| *k == v.kind())
                    .map(|(_, h)| *h)
            });
            match matched {
                Some(h) => hint = h,
                None if value.required => return self.children(node, &[], in_type),
                None => {}
            }
        }

        let name_node = resolve_path(node, rule.name);
        let name = name_node.and_then(|n| last_segment(self.text(n)));
        let Some(name) = name else {
            if node.has_error() {
                return vec![SyntaxNode::new(SyntaxKind::Error, None, span_of(node))];
            }
            // anonymous declaration, e.g. an embedded Go field
            return self.children(node, &[], in_type);
        };
        if let Some(n) = name_node {
            skip.push(n.id());
        }

        if rule.kind == SyntaxKind::Function && in_type && hint == "function" {
            hint = "method";
        }

        let mut children = Vec::new();
        for field in rule.inherit_fields {
            if let Some(base) = node.child_by_field_name(field) {
                skip.push(base.id());
                children.extend(self.base_types(base));
            }
        }

        let owner = match rule.owner {
            Some(path) => {
                let head = path.split('/').next().unwrap_or(path);
                if let Some(h) = resolve_path(node, head) {
                    skip.push(h.id());
                }
                resolve_path(node, path).and_then(|o| self.type_names(o).into_iter().next())
            }
            None => None,
        };

        children.extend(self.children(node, &skip, rule.kind == SyntaxKind::Type));
        let decl = SyntaxNode {
            kind: rule.kind,
            name: Some(name),
            span: span_of(node),
            children,
            type_hint: Some(hint.to_string()),
        };

        match owner {
            Some((owner, _)) => {
                self.owned.push((owner, decl));
                Vec::new()
            }
            None => vec![decl],
        }
    }

    fn call(&mut self, node: Node, rule: &CallRule) -> Vec<SyntaxNode> {
        let Some(callee) = node.child_by_field_name(rule.callee) else {
            return self.children(node, &[], false);
        };

        let mut skip = vec![callee.id()];
        // nested calls hide in receivers: `a.b().c()`
        let mut receiver_nodes = Vec::new();

        let target = match rule.receiver {
            Some(field) => {
                let method = self.text(callee).to_string();
                match node.child_by_field_name(field) {
                    Some(receiver) => {
                        skip.push(receiver.id());
                        receiver_nodes.extend(self.convert(receiver, false));
                        Some(self.member_path(receiver, method))
                    }
                    None => Some((vec![method], false)),
                }
            }
            None => self.callee_path(callee, &mut receiver_nodes),
        };

        let mut children = receiver_nodes;
        children.extend(self.children(node, &skip, false));

        let Some((segments, dynamic)) = target.filter(|(s, _)| !s.is_empty()) else {
            return children;
        };

        if let Some(ctor) = self.rules.constructor_method {
            if !dynamic && segments.len() > 1 && segments.last().is_some_and(|m| m == ctor) {
                let type_path = segments[..segments.len() - 1].join(".");
                let mut inst = SyntaxNode::new(SyntaxKind::Instantiate, Some(type_path), span_of(node));
                inst.children = children;
                return vec![inst];
            }
        }

        let mut call = SyntaxNode::new(SyntaxKind::Call, Some(segments.join(".")), span_of(node));
        if dynamic {
            call.type_hint = Some(HINT_MEMBER_CALL.to_string());
        }
        call.children = children;
        vec![call]
    }

    /// Decompose a callee expression into path segments plus a dynamic
    /// dispatch flag. Calls found inside receivers are pushed to `nested`.
    fn callee_path(&mut self, mut callee: Node, nested: &mut Vec<SyntaxNode>) -> Option<(Vec<String>, bool)> {
        loop {
            let kind = callee.kind();
            if self.rules.static_paths.contains(&kind) {
                return Some((split_path(self.text(callee)), false));
            }
            if let Some(member) = self.rules.member(kind) {
                let property = callee.child_by_field_name(member.property)?;
                let property = self.text(property).to_string();
                return match callee.child_by_field_name(member.object) {
                    Some(object) => {
                        nested.extend(self.convert(object, false));
                        Some(self.member_path(object, property))
                    }
                    None => Some((vec![property], false)),
                };
            }
            if callee.named_child_count() == 0 {
                return Some((split_path(self.text(callee)), false));
            }
            // generic_function and friends wrap the real callee
            if let Some(inner) = callee.child_by_field_name("function") {
                callee = inner;
                continue;
            }
            if kind.ends_with("identifier") || kind.ends_with("name") {
                return Some((split_path(self.text(callee)), false));
            }
            nested.extend(self.convert(callee, false));
            return None;
        }
    }

    /// `object.property(...)`: static when the object is `self`, a static path
    /// or a type name, dynamic otherwise.
    fn member_path(&self, object: Node, property: String) -> (Vec<String>, bool) {
        let object_text = self.text(object);
        if self.rules.self_receivers.contains(&object_text) {
            return (vec![property], false);
        }
        if self.rules.static_paths.contains(&object.kind()) {
            let mut segments = split_path(object_text);
            segments.push(property);
            return (segments, false);
        }
        if object.named_child_count() == 0 {
            let is_type_name = object_text.chars().next().is_some_and(char::is_uppercase);
            return (vec![object_text.to_string(), property], !is_type_name);
        }
        if let Some(member) = self.rules.member(object.kind()) {
            if let Some(inner) = object.child_by_field_name(member.property) {
                return (vec![self.text(inner).to_string(), property], true);
            }
        }
        (vec![property], true)
    }

    fn instantiation(&mut self, node: Node, rule: &InstRule) -> Vec<SyntaxNode> {
        let type_node = node.child_by_field_name(rule.type_field);
        let path = type_node
            .map(|t| split_path(self.text(t)))
            .filter(|p| !p.is_empty());
        let skip: Vec<usize> = type_node.iter().map(|t| t.id()).collect();
        let children = self.children(node, &skip, false);
        match path {
            Some(path) => {
                let mut inst =
                    SyntaxNode::new(SyntaxKind::Instantiate, Some(path.join(".")), span_of(node));
                inst.children = children;
                vec![inst]
            }
            None => children,
        }
    }

    fn base_types(&self, node: Node) -> Vec<SyntaxNode> {
        self.type_names(node)
            .into_iter()
            .map(|(name, span)| SyntaxNode::new(SyntaxKind::Inherit, Some(name), span))
            .collect()
    }

    /// Every type named in a base list or receiver, outermost first.
    fn type_names(&self, node: Node) -> Vec<(String, Span)> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(node) = stack.pop() {
            let kind = node.kind();
            if BASE_LIST_NOISE.contains(&kind) || self.rules.is_skipped(kind) || !node.is_named() {
                continue;
            }
            let leaf = node.named_child_count() == 0;
            if leaf
                || self.rules.static_paths.contains(&kind)
                || self.rules.type_uses.contains(&kind)
                || self.rules.member(kind).is_some()
            {
                let path = split_path(self.text(node));
                if !path.is_empty() {
                    out.push((path.join("."), span_of(node)));
                }
                continue;
            }
            let mut cursor = node.walk();
            let kids: Vec<Node> = node.named_children(&mut cursor).collect();
            stack.extend(kids.into_iter().rev());
        }
        out
    }

    fn import(&self, node: Node) -> Vec<SyntaxNode> {
        let Some(import_fn) = self.rules.import_fn else {
            return Vec::new();
        };
        let span = span_of(node);
        import_fn(node, self.source)
            .into_iter()
            .map(|spec| {
                let items = spec
                    .items
                    .into_iter()
                    .map(|item| {
                        let mut ident = SyntaxNode::new(SyntaxKind::Identifier, Some(item.name), span);
                        ident.type_hint = item.alias;
                        ident
                    })
                    .collect();
                SyntaxNode::new(SyntaxKind::Import, Some(spec.module), span).with_children(items)
            })
            .collect()
    }

    /// Re-parent owned declarations under the root-level type they belong
    /// to, creating that type when it is declared in another file.
    fn attach_owned(&mut self, root: &mut SyntaxNode) {
        for (owner, decl) in std::mem::take(&mut self.owned) {
            let existing = root
                .children
                .iter_mut()
                .find(|c| c.kind == SyntaxKind::Type && c.name.as_deref() == Some(owner.as_str()));
            match existing {
                Some(ty) => ty.children.push(decl),
                None => {
                    let span = decl.span;
                    root.children.push(
                        SyntaxNode::new(SyntaxKind::Type, Some(owner), span)
                            .with_hint("type")
                            .with_children(vec![decl]),
                    );
                }
            }
        }
    }
}
