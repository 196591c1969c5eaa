//! Extractor: normalized tree → symbol declarations + raw references.
//!
//! Every declaration becomes a [`Symbol`] contained by its enclosing
//! declaration, and every call, instantiation, inheritance, import and type
//! use becomes a [`Reference`] whose source is the enclosing symbol. Targets
//! are left for the symbol index to resolve.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::{CodescopeError, Result};
use crate::graph::types::{
    ExtractionDiagnostic, FileExtraction, ImportBinding, Reference, ReferenceId, ReferenceKind,
    Resolution, SourceUnit, Symbol, SymbolId, SymbolKind,
};
use crate::parser::{AdapterRegistry, SyntaxKind, SyntaxNode, SyntaxTree, HINT_MEMBER_CALL};

/// Parse and extract one unit.
///
/// A parse error is not fatal: the partial tree is extracted and the
/// extraction carries the error reason so the unit is marked incomplete.
pub fn extract_file(registry: &AdapterRegistry, unit: &SourceUnit) -> Result<FileExtraction> {
    let adapter = registry
        .get(&unit.language)
        .ok_or_else(|| CodescopeError::UnsupportedLanguage(unit.language.clone()))?;
    let path = unit.key();

    let (tree, parse_error) = match adapter.parse(&unit.text) {
        Ok(tree) => (tree, None),
        Err(e) => {
            warn!(file = %path, reason = %e.reason, "partial parse");
            (e.partial, Some(e.reason))
        }
    };

    let mut extraction = extract_tree(&path, &unit.language, &tree);
    extraction.content_hash = unit.content_hash.clone();
    extraction.parse_error = parse_error;
    debug!(
        file = %path,
        symbols = extraction.symbols.len(),
        references = extraction.references.len(),
        diagnostics = extraction.diagnostics.len(),
        "extracted"
    );
    Ok(extraction)
}

/// Extract declarations and raw references from a normalized tree.
pub fn extract_tree(path: &str, language: &str, tree: &SyntaxTree) -> FileExtraction {
    let module_name = Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| path.to_string());

    let mut walker = Walker {
        path,
        language,
        symbols: Vec::new(),
        positions: HashMap::new(),
        references: Vec::new(),
        imports: Vec::new(),
        diagnostics: Vec::new(),
        ordinals: HashMap::new(),
        seen_uses: HashSet::new(),
    };

    let module_id = SymbolId::new(path, &module_name);
    walker.declare(Symbol {
        id: module_id.clone(),
        name: module_name.clone(),
        qualified_name: module_name.clone(),
        kind: SymbolKind::Module,
        type_hint: Some("file".to_string()),
        path: path.to_string(),
        language: language.to_string(),
        span: tree.root.span,
        container: None,
        overloaded: false,
    });
    walker.walk(&tree.root, module_id, module_name);
    walker.mark_overloaded_uses();

    FileExtraction {
        path: path.to_string(),
        language: language.to_string(),
        content_hash: String::new(),
        parsed_at: Utc::now(),
        symbols: walker.symbols,
        references: walker.references,
        imports: walker.imports,
        diagnostics: walker.diagnostics,
        parse_error: None,
    }
}

struct Walker<'a> {
    path: &'a str,
    language: &'a str,
    symbols: Vec<Symbol>,
    positions: HashMap<SymbolId, usize>,
    references: Vec<Reference>,
    imports: Vec<ImportBinding>,
    diagnostics: Vec<ExtractionDiagnostic>,
    ordinals: HashMap<(SymbolId, ReferenceKind, String), usize>,
    /// `uses` references are recorded once per (source, name).
    seen_uses: HashSet<(SymbolId, String)>,
}

impl<'a> Walker<'a> {
    /// Pre-order walk over `root`'s descendants. Trees from a registered
    /// adapter have no depth bound, so the walk keeps its own stack. Each
    /// entry is a node plus the index of its enclosing (container, prefix)
    /// scope.
    fn walk(&mut self, root: &SyntaxNode, container: SymbolId, prefix: String) {
        let mut scopes: Vec<(SymbolId, String)> = vec![(container, prefix)];
        let mut stack: Vec<(&SyntaxNode, usize)> = root.children.iter().rev().map(|c| (c, 0)).collect();

        while let Some((node, scope)) = stack.pop() {
            let container = scopes[scope].0.clone();
            match node.kind {
                SyntaxKind::Module | SyntaxKind::Type | SyntaxKind::Function | SyntaxKind::Field => {
                    let prefix = scopes[scope].1.clone();
                    if let Some(inner) = self.declaration(node, &container, &prefix) {
                        scopes.push(inner);
                        let inner = scopes.len() - 1;
                        stack.extend(node.children.iter().rev().map(|c| (c, inner)));
                    }
                }
                SyntaxKind::Import => self.import(node, &container),
                SyntaxKind::Call
                | SyntaxKind::Instantiate
                | SyntaxKind::Inherit
                | SyntaxKind::Identifier => {
                    self.reference(node, &container);
                    stack.extend(node.children.iter().rev().map(|c| (c, scope)));
                }
                SyntaxKind::Error => self.diagnose(node, &container),
            }
        }
    }

    /// Declare `node` and return the scope its children belong to.
    fn declaration(&mut self, node: &SyntaxNode, container: &SymbolId, prefix: &str) -> Option<(SymbolId, String)> {
        let (Some(name), Some(kind)) = (node.name.as_deref(), SymbolKind::from_syntax(node.kind)) else {
            self.diagnose(node, container);
            return None;
        };
        let qualified = format!("{}::{}", prefix, name);
        let id = SymbolId::new(self.path, &qualified);

        self.declare(Symbol {
            id: id.clone(),
            name: name.to_string(),
            qualified_name: qualified.clone(),
            kind,
            type_hint: node.type_hint.clone(),
            path: self.path.to_string(),
            language: self.language.to_string(),
            span: node.span,
            container: Some(container.clone()),
            overloaded: false,
        });
        Some((id, qualified))
    }

    /// Insert a symbol, merging repeated declarations of one identity.
    fn declare(&mut self, symbol: Symbol) {
        match self.positions.get(&symbol.id) {
            Some(&i) => {
                let existing = &mut self.symbols[i];
                if existing.kind == SymbolKind::Function && symbol.kind == SymbolKind::Function {
                    existing.overloaded = true;
                } else if existing.type_hint.as_deref() == Some("impl")
                    && symbol.type_hint.as_deref() != Some("impl")
                {
                    // the type definition is the canonical location, not its impl block
                    existing.type_hint = symbol.type_hint;
                    existing.span = symbol.span;
                }
            }
            None => {
                self.positions.insert(symbol.id.clone(), self.symbols.len());
                self.symbols.push(symbol);
            }
        }
    }

    fn import(&mut self, node: &SyntaxNode, container: &SymbolId) {
        let module = node.name.clone().unwrap_or_default();
        for item in &node.children {
            let Some(name) = item.name.clone() else {
                continue;
            };
            let binding = ImportBinding {
                module: module.clone(),
                name,
                alias: item.type_hint.clone(),
                span: item.span,
            };
            if !binding.is_wildcard() {
                let qualifier = binding.module_leaf().map(str::to_string);
                let name = binding.name.clone();
                self.push_reference(container, ReferenceKind::Imports, name, qualifier, item, false);
            }
            self.imports.push(binding);
        }
    }

    fn reference(&mut self, node: &SyntaxNode, container: &SymbolId) {
        let Some(kind) = ReferenceKind::from_syntax(node.kind) else {
            return;
        };
        let Some(literal) = node.name.as_deref() else {
            self.diagnose(node, container);
            return;
        };
        let mut segments: Vec<&str> = literal.split('.').filter(|s| !s.is_empty()).collect();
        let Some(name) = segments.pop() else {
            return;
        };
        let qualifier = segments.pop().map(str::to_string);

        if kind == ReferenceKind::Uses
            && !self.seen_uses.insert((container.clone(), literal.to_string()))
        {
            return;
        }
        let dynamic = node.type_hint.as_deref() == Some(HINT_MEMBER_CALL);
        self.push_reference(container, kind, name.to_string(), qualifier, node, dynamic);
    }

    fn push_reference(
        &mut self,
        source: &SymbolId,
        kind: ReferenceKind,
        name: String,
        qualifier: Option<String>,
        node: &SyntaxNode,
        dynamic: bool,
    ) {
        let literal = match &qualifier {
            Some(q) => format!("{}.{}", q, name),
            None => name.clone(),
        };
        let counter = self
            .ordinals
            .entry((source.clone(), kind, literal.clone()))
            .or_insert(0);
        let ordinal = *counter;
        *counter += 1;

        // dynamic dispatch is never resolved with certainty
        let resolution = if dynamic {
            Resolution::Ambiguous {
                candidates: Vec::new(),
                preferred: None,
            }
        } else {
            Resolution::Unresolved
        };

        self.references.push(Reference {
            id: ReferenceId::new(source, kind, &literal, ordinal),
            source: source.clone(),
            kind,
            name,
            qualifier,
            path: self.path.to_string(),
            span: node.span,
            dynamic,
            resolution,
        });
    }

    fn diagnose(&mut self, node: &SyntaxNode, container: &SymbolId) {
        let message = match (&node.kind, &node.name) {
            (SyntaxKind::Error, Some(detail)) => format!("skipped malformed region: {}", detail),
            (SyntaxKind::Error, None) => "skipped malformed region".to_string(),
            (kind, _) => format!("skipped unnamed {}", kind),
        };
        self.diagnostics.push(ExtractionDiagnostic {
            path: self.path.to_string(),
            span: node.span,
            message,
            symbol: Some(container.clone()),
        });
    }

    /// Uses of a name declared more than once in one container start out
    /// ambiguous.
    fn mark_overloaded_uses(&mut self) {
        let overloaded: HashSet<&str> = self
            .symbols
            .iter()
            .filter(|s| s.overloaded)
            .map(|s| s.name.as_str())
            .collect();
        if overloaded.is_empty() {
            return;
        }
        for reference in &mut self.references {
            if overloaded.contains(reference.name.as_str())
                && reference.resolution == Resolution::Unresolved
            {
                reference.resolution = Resolution::Ambiguous {
                    candidates: Vec::new(),
                    preferred: None,
                };
            }
        }
    }
}
